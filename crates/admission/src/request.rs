use std::net::SocketAddr;

/// Host-neutral view of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub peer_addr: Option<SocketAddr>,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, path: &str) -> Self {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        Self {
            method: method.into(),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            headers: Vec::new(),
            peer_addr: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_peer(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// First value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

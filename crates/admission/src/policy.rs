use tollgate_common::{BucketSettings, RouteConfig, TollgateResult};
use tollgate_rate_limit::{BucketConfig, RateLimiter};

/// Admission policy for one protected route, or the process-wide default.
///
/// Each policy owns its own limiter, so clients are tracked per route and a
/// burst against one route never spends tokens on another.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub name: String,
    pub path_prefix: String,
    pub methods: Vec<String>,
    pub client_id: Option<String>,
    pub message: String,
    pub limiter: RateLimiter,
}

impl RoutePolicy {
    /// Policy applied to requests no route claims.
    pub fn default_policy(settings: &BucketSettings, message: &str) -> TollgateResult<Self> {
        Ok(Self {
            name: "default".to_string(),
            path_prefix: "/".to_string(),
            methods: vec![],
            client_id: None,
            message: message.to_string(),
            limiter: RateLimiter::new(BucketConfig::try_from(settings)?),
        })
    }

    /// Policy for a configured route. `fallback_message` is used when the
    /// route has none of its own.
    pub fn from_route(route: &RouteConfig, fallback_message: &str) -> TollgateResult<Self> {
        Ok(Self {
            name: route.name.clone(),
            path_prefix: route.path_prefix.clone(),
            methods: route.methods.clone(),
            client_id: route.client_id.clone().filter(|id| !id.is_empty()),
            message: route
                .message
                .clone()
                .unwrap_or_else(|| fallback_message.to_string()),
            limiter: RateLimiter::new(BucketConfig::try_from(&route.bucket)?),
        })
    }

    /// Returns `true` if this route claims `method path`.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        let method_match =
            self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method));

        method_match && prefix_matches(&self.path_prefix, path)
    }
}

/// Segment-aware prefix match: `/user` matches `/user` and `/user/1`, not `/username`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(prefix: &str, methods: &[&str]) -> RoutePolicy {
        let config = RouteConfig {
            name: "r".into(),
            path_prefix: prefix.into(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            client_id: Some(String::new()),
            message: None,
            bucket: BucketSettings::default(),
        };
        RoutePolicy::from_route(&config, "fallback").unwrap()
    }

    #[test]
    fn prefix_match_respects_segments() {
        let user = route("/user", &[]);
        assert!(user.matches("GET", "/user"));
        assert!(user.matches("GET", "/user/42"));
        assert!(!user.matches("GET", "/username"));
        assert!(!user.matches("GET", "/"));

        let root = route("/", &[]);
        assert!(root.matches("GET", "/anything"));
    }

    #[test]
    fn method_filter_is_case_insensitive() {
        let get_only = route("/user", &["GET"]);
        assert!(get_only.matches("get", "/user"));
        assert!(!get_only.matches("POST", "/user"));
    }

    #[test]
    fn route_inherits_fallback_message_and_drops_empty_client_id() {
        let policy = route("/user", &[]);
        assert_eq!(policy.message, "fallback");
        assert!(policy.client_id.is_none());
    }
}

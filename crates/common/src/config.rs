use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::TollgateError;

/// Name of the only bucket algorithm the admission core implements.
pub const TOKEN_BUCKET: &str = "token_bucket";

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Process-wide admission settings, applied to every route that does not
/// override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Rejection message override. The reset hint is appended to it.
    #[serde(default)]
    pub message: Option<String>,
    /// Per-deployment HMAC key. When absent the built-in shared secret is used.
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    #[serde(default)]
    pub signature_mode: SignatureMode,
    /// Networks whose forwarding headers are trusted. Empty trusts every peer.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Idle client state older than this is evicted. 0 disables the reaper.
    #[serde(default = "default_idle_eviction_secs")]
    pub idle_eviction_secs: u64,
    #[serde(default)]
    pub default: BucketSettings,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message: None,
            secret_key: None,
            signature_header: default_signature_header(),
            signature_mode: SignatureMode::default(),
            trusted_proxies: vec![],
            idle_eviction_secs: default_idle_eviction_secs(),
            default: BucketSettings::default(),
        }
    }
}

/// How a presented signature that does not verify is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    /// Issue a fresh signature and let the request through to the limiter.
    #[default]
    Issue,
    /// Reject a mismatching signature with 401. A missing one is still issued.
    Enforce,
}

/// Bucket parameters as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketSettings {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,
    #[serde(default = "default_refill_period_ms")]
    pub refill_period_ms: u64,
    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,
    #[serde(default = "default_block_duration_ms")]
    pub block_duration_ms: u64,
    /// Retries closer together than this while the bucket is empty count as
    /// violations. Defaults to the time it takes to accrue one token.
    #[serde(default)]
    pub min_request_spacing_ms: Option<u64>,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            refill_period_ms: default_refill_period_ms(),
            block_threshold: default_block_threshold(),
            block_duration_ms: default_block_duration_ms(),
            min_request_spacing_ms: None,
        }
    }
}

impl BucketSettings {
    /// Check the settings describe a usable token bucket.
    pub fn validate(&self) -> Result<(), TollgateError> {
        if self.algorithm != TOKEN_BUCKET {
            return Err(TollgateError::UnsupportedConfiguration(format!(
                "bucket algorithm '{}'",
                self.algorithm
            )));
        }
        if self.capacity == 0 {
            return Err(TollgateError::Config("capacity must be at least 1".into()));
        }
        if !(self.refill_rate.is_finite() && self.refill_rate > 0.0) {
            return Err(TollgateError::Config(
                "refill_rate must be a positive number".into(),
            ));
        }
        if self.refill_period_ms == 0 {
            return Err(TollgateError::Config(
                "refill_period_ms must be greater than 0".into(),
            ));
        }
        if self.block_threshold == 0 {
            return Err(TollgateError::Config(
                "block_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A protected route with its own bucket and, optionally, a fixed identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Upper-case HTTP methods. Empty matches any method.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Static client identity, used verbatim instead of the network origin.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub bucket: BucketSettings,
}

// Default value helpers
fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_true() -> bool {
    true
}
fn default_signature_header() -> String {
    "x-request-signature".to_string()
}
fn default_idle_eviction_secs() -> u64 {
    300
}
fn default_algorithm() -> String {
    TOKEN_BUCKET.to_string()
}
fn default_capacity() -> u32 {
    2
}
fn default_refill_rate() -> f64 {
    1.0
}
fn default_refill_period_ms() -> u64 {
    6000
}
fn default_block_threshold() -> u32 {
    10
}
fn default_block_duration_ms() -> u64 {
    6000
}
fn default_path_prefix() -> String {
    "/".to_string()
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.admission.signature_header.trim().is_empty() {
            anyhow::bail!("admission.signature_header must not be empty");
        }

        self.admission.default.validate()?;
        self.trusted_networks()?;

        let mut names = HashSet::new();
        for route in &self.routes {
            if route.name.is_empty() {
                anyhow::bail!("route with path_prefix '{}' has no name", route.path_prefix);
            }
            if !names.insert(route.name.as_str()) {
                anyhow::bail!("duplicate route name '{}'", route.name);
            }
            if !route.path_prefix.starts_with('/') {
                anyhow::bail!(
                    "route '{}' path_prefix must start with '/' (got '{}')",
                    route.name,
                    route.path_prefix
                );
            }
            route
                .bucket
                .validate()
                .map_err(|e| anyhow::anyhow!("route '{}': {}", route.name, e))?;
        }

        Ok(())
    }

    /// Parse `admission.trusted_proxies` into networks. Bare addresses are
    /// treated as single-host networks.
    pub fn trusted_networks(&self) -> Result<Vec<IpNet>, TollgateError> {
        self.admission
            .trusted_proxies
            .iter()
            .map(|entry| {
                let entry = entry.trim();
                entry
                    .parse::<IpNet>()
                    .or_else(|_| entry.parse::<std::net::IpAddr>().map(IpNet::from))
                    .map_err(|_| {
                        TollgateError::Config(format!("invalid trusted proxy '{}'", entry))
                    })
            })
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            admission: AdmissionConfig::default(),
            routes: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert!(config.admission.enabled);
        assert_eq!(config.admission.signature_header, "x-request-signature");
        assert_eq!(config.admission.signature_mode, SignatureMode::Issue);
        assert_eq!(config.admission.default.capacity, 2);
        assert_eq!(config.admission.default.refill_period_ms, 6000);
        assert_eq!(config.admission.default.block_threshold, 10);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn parses_routes_and_overrides() {
        let yaml = r#"
admission:
  message: "Slow down"
  secret_key: "deployment-key"
  signature_mode: enforce
  trusted_proxies: ["10.0.0.0/8", "192.168.1.1"]
routes:
  - name: user
    path_prefix: /user
    methods: [GET]
    client_id: new_user
    bucket:
      capacity: 1
      refill_rate: 1
      refill_period_ms: 1000
      block_threshold: 2
      block_duration_ms: 60000
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.admission.signature_mode, SignatureMode::Enforce);
        assert_eq!(config.routes.len(), 1);
        let route = &config.routes[0];
        assert_eq!(route.client_id.as_deref(), Some("new_user"));
        assert_eq!(route.bucket.capacity, 1);
        assert_eq!(route.bucket.block_duration_ms, 60000);
        assert_eq!(config.trusted_networks().unwrap().len(), 2);
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let yaml = r#"
admission:
  default:
    algorithm: sliding_window
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        let err = err.downcast::<TollgateError>().unwrap();
        assert!(matches!(err, TollgateError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn rejects_zero_capacity_and_period() {
        let mut settings = BucketSettings::default();
        settings.capacity = 0;
        assert!(matches!(settings.validate(), Err(TollgateError::Config(_))));

        let mut settings = BucketSettings::default();
        settings.refill_period_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = BucketSettings::default();
        settings.refill_rate = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_route_names() {
        let yaml = r#"
routes:
  - name: a
    path_prefix: /a
  - name: a
    path_prefix: /b
"#;
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn rejects_bad_trusted_proxy() {
        let yaml = r#"
admission:
  trusted_proxies: ["not-a-network"]
"#;
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn rejects_relative_path_prefix() {
        let yaml = r#"
routes:
  - name: a
    path_prefix: user
"#;
        assert!(AppConfig::from_yaml(yaml).is_err());
    }
}

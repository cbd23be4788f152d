//! Admission facade for tollgate.
//!
//! [`Admission::check`] takes a [`RequestDescriptor`] from the host layer and
//! returns a [`Verdict`]:
//!
//! 1. pick the [`RoutePolicy`] claiming the request, else the default policy
//! 2. resolve the client identity and verify or refresh its signature
//! 3. ask the route's token bucket whether the client may proceed
//!
//! The host renders the verdict: status, body, `retry-after`, and the
//! signature header to hand back to the caller.

pub mod clock;
pub mod policy;
pub mod request;
pub mod verdict;

use std::sync::Arc;
use std::time::Duration;

use tollgate_common::{AppConfig, SignatureMode, TollgateResult};
use tollgate_rate_limit::{saturating_millis, Decision};
use tollgate_signature::{
    ClientIdentityResolver, RequestHints, SignatureCodec, SignatureContext, SignatureOutcome,
};
use tracing::{debug, info};

pub use clock::{Clock, ManualClock, SystemClock};
pub use policy::RoutePolicy;
pub use request::RequestDescriptor;
pub use verdict::{Rejection, Verdict, DEFAULT_MESSAGE};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-client admission control for every configured route.
///
/// Safe to share across threads; wrap it in an `Arc` and call
/// [`check`](Self::check) from every request handler.
#[derive(Debug)]
pub struct Admission {
    enabled: bool,
    default: RoutePolicy,
    routes: Vec<RoutePolicy>,
    codec: SignatureCodec,
    resolver: ClientIdentityResolver,
    signature_header: String,
    signature_mode: SignatureMode,
    idle_eviction: Duration,
    clock: Arc<dyn Clock>,
}

impl Admission {
    /// Build every route policy from configuration.
    ///
    /// Fails on configuration the core cannot honour, such as an unsupported
    /// bucket algorithm. Nothing is checked per request.
    pub fn from_config(config: &AppConfig) -> TollgateResult<Self> {
        let admission = &config.admission;
        let message = admission.message.as_deref().unwrap_or(DEFAULT_MESSAGE);

        let default = RoutePolicy::default_policy(&admission.default, message)?;
        let routes = config
            .routes
            .iter()
            .map(|route| RoutePolicy::from_route(route, message))
            .collect::<TollgateResult<Vec<_>>>()?;

        info!(
            enabled = admission.enabled,
            routes = routes.len(),
            mode = ?admission.signature_mode,
            "admission control configured"
        );

        Ok(Self {
            enabled: admission.enabled,
            default,
            routes,
            codec: SignatureCodec::new(admission.secret_key.as_deref()),
            resolver: ClientIdentityResolver::new(config.trusted_networks()?),
            signature_header: admission.signature_header.to_ascii_lowercase(),
            signature_mode: admission.signature_mode,
            idle_eviction: Duration::from_secs(admission.idle_eviction_secs),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Name of the header carrying the request signature, lower-cased.
    pub fn signature_header(&self) -> &str {
        &self.signature_header
    }

    /// Policy that governs `method path`.
    pub fn route_for(&self, method: &str, path: &str) -> &RoutePolicy {
        self.routes
            .iter()
            .find(|route| route.matches(method, path))
            .unwrap_or(&self.default)
    }

    /// Start the idle-state reaper for every route, unless disabled.
    ///
    /// Returns the number of reapers started.
    pub fn start_cleanup_tasks(&self) -> std::io::Result<usize> {
        if self.idle_eviction.is_zero() {
            return Ok(0);
        }
        let mut started = 0;
        for policy in self.routes.iter().chain(std::iter::once(&self.default)) {
            policy
                .limiter
                .start_cleanup_task(CLEANUP_INTERVAL, self.idle_eviction)?;
            started += 1;
        }
        Ok(started)
    }

    /// Decide whether to admit `request`.
    pub fn check(&self, request: &RequestDescriptor) -> Verdict {
        if !self.enabled {
            return Verdict::admitted(None);
        }

        let policy = self.route_for(&request.method, &request.path);

        let client_id = self.resolver.resolve(&RequestHints {
            identity_hint: policy.client_id.as_deref(),
            headers: &request.headers,
            peer_addr: request.peer_addr,
        });

        let signature = SignatureContext::new(
            &self.codec,
            &request.method,
            &request.path,
            client_id,
            request.header(&self.signature_header).map(str::to_string),
        );

        let issued = match signature.outcome(&self.codec, self.signature_mode) {
            SignatureOutcome::Valid | SignatureOutcome::Unavailable => None,
            SignatureOutcome::Issued(token) => Some(token),
            SignatureOutcome::Rejected => {
                info!(
                    route = %policy.name,
                    client_id = %signature.client_id,
                    "request rejected: signature mismatch"
                );
                return Verdict::invalid_signature();
            }
        };

        let key = signature.limiter_key();
        let now = self.clock.now();

        let rejection = match policy.limiter.allow(key, now) {
            Decision::Admitted => {
                debug!(route = %policy.name, client_id = %signature.client_id, "request admitted");
                return Verdict::admitted(issued);
            }
            Decision::RateLimited => Rejection::RateLimited,
            Decision::Blocked => Rejection::Blocked,
        };

        let wait = policy.limiter.remaining_time(key, now);
        info!(
            route = %policy.name,
            client_id = %signature.client_id,
            decision = ?rejection,
            retry_after_ms = saturating_millis(wait),
            "request rate limited"
        );
        Verdict::rate_limited(rejection, wait, issued, &policy.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admission(yaml: &str) -> Admission {
        Admission::from_config(&AppConfig::from_yaml(yaml).unwrap()).unwrap()
    }

    #[test]
    fn unmatched_requests_use_default_policy() {
        let admission = admission(
            r#"
routes:
  - name: user
    path_prefix: /user
"#,
        );
        assert_eq!(admission.route_for("GET", "/user/1").name, "user");
        assert_eq!(admission.route_for("GET", "/").name, "default");
    }

    #[test]
    fn disabled_admission_admits_everything() {
        let admission = admission(
            r#"
admission:
  enabled: false
  default: { capacity: 1 }
"#,
        );
        let request = RequestDescriptor::new("GET", "/");
        for _ in 0..5 {
            let verdict = admission.check(&request);
            assert!(verdict.admitted);
            assert!(verdict.signature_header.is_none());
        }
    }

    #[test]
    fn signature_header_name_is_normalised() {
        let admission = admission(
            r#"
admission:
  signature_header: X-Request-Signature
"#,
        );
        assert_eq!(admission.signature_header(), "x-request-signature");
    }

    #[test]
    fn no_reaper_when_eviction_disabled() {
        let admission = admission(
            r#"
admission:
  idle_eviction_secs: 0
routes:
  - name: user
    path_prefix: /user
"#,
        );
        assert_eq!(admission.start_cleanup_tasks().unwrap(), 0);
    }

    #[test]
    fn one_reaper_per_route_and_default() {
        let admission = admission(
            r#"
admission:
  idle_eviction_secs: 300
routes:
  - name: user
    path_prefix: /user
"#,
        );
        assert_eq!(admission.start_cleanup_tasks().unwrap(), 2);
    }
}

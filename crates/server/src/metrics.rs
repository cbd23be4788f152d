use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use tollgate_admission::{Rejection, Verdict};

/// Prometheus counters for admission outcomes.
pub struct ServerMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub requests_admitted: IntCounter,
    pub requests_rate_limited: IntCounter,
    pub requests_blocked: IntCounter,
    pub signatures_issued: IntCounter,
    pub signatures_rejected: IntCounter,
}

impl ServerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total =
            IntCounter::new("tollgate_requests_total", "Total requests checked")?;
        let requests_admitted =
            IntCounter::new("tollgate_requests_admitted", "Total requests admitted")?;
        let requests_rate_limited = IntCounter::new(
            "tollgate_requests_rate_limited",
            "Total requests rejected for exceeding the rate limit",
        )?;
        let requests_blocked = IntCounter::new(
            "tollgate_requests_blocked",
            "Total requests rejected during a lockout",
        )?;
        let signatures_issued = IntCounter::new(
            "tollgate_signatures_issued",
            "Total request signatures handed out",
        )?;
        let signatures_rejected = IntCounter::new(
            "tollgate_signatures_rejected",
            "Total requests rejected for a mismatched signature",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_admitted.clone()))?;
        registry.register(Box::new(requests_rate_limited.clone()))?;
        registry.register(Box::new(requests_blocked.clone()))?;
        registry.register(Box::new(signatures_issued.clone()))?;
        registry.register(Box::new(signatures_rejected.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            requests_admitted,
            requests_rate_limited,
            requests_blocked,
            signatures_issued,
            signatures_rejected,
        })
    }

    pub fn record(&self, verdict: &Verdict) {
        self.requests_total.inc();
        if verdict.signature_header.is_some() {
            self.signatures_issued.inc();
        }
        match verdict.rejection {
            None => self.requests_admitted.inc(),
            Some(Rejection::RateLimited) => self.requests_rate_limited.inc(),
            Some(Rejection::Blocked) => self.requests_blocked.inc(),
            Some(Rejection::InvalidSignature) => self.signatures_rejected.inc(),
        }
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

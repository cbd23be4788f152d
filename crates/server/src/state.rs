use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use http::HeaderName;
use tollgate_admission::Admission;

use crate::metrics::ServerMetrics;

/// Shared state type alias used across all handlers.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub admission: Admission,
    pub metrics: ServerMetrics,
    /// Parsed once so the middleware never fails on a bad header name.
    pub signature_header: HeaderName,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(admission: Admission) -> anyhow::Result<SharedState> {
        let signature_header = HeaderName::from_bytes(admission.signature_header().as_bytes())
            .with_context(|| {
                format!("invalid signature header name: {}", admission.signature_header())
            })?;

        Ok(Arc::new(Self {
            admission,
            metrics: ServerMetrics::new()?,
            signature_header,
            start_time: Instant::now(),
        }))
    }
}

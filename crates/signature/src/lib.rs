//! Signed client identity for tollgate.
//!
//! The [`ClientIdentityResolver`] turns a request into a client identifier,
//! and the [`SignatureCodec`] binds that identifier to the canonical request
//! string with HMAC-SHA256. The resulting token is round-tripped to the
//! client through a response header. Rate limiting keys on the resolved
//! identifier itself, so one client has one bucket per route however many
//! endpoints it calls.

pub mod codec;
pub mod identity;

use tollgate_common::SignatureMode;
use tracing::warn;

pub use codec::{sign, verify, SignatureCodec, SHARED_SECRET};
pub use identity::{ClientIdentityResolver, RequestHints, FORWARDING_HEADERS};

/// Canonical string signed for a request: `"<METHOD> <path>"`.
pub fn canonical_request(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

/// What to do with the signature presented on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// The presented signature verified; nothing to issue.
    Valid,
    /// No valid signature was presented. The caller should hand this one back.
    Issued(String),
    /// A signature was presented that does not verify, and enforcement is on.
    Rejected,
    /// The signature could not be computed; the request proceeds unsigned.
    Unavailable,
}

/// Per-request signature state. Never persisted.
#[derive(Debug, Clone)]
pub struct SignatureContext {
    pub request_string: String,
    pub client_id: String,
    pub received: Option<String>,
    pub computed: Option<String>,
}

impl SignatureContext {
    /// Compute the expected signature for `client_id` on `method path`.
    ///
    /// A MAC failure is logged and leaves `computed` empty rather than failing
    /// the request.
    pub fn new(
        codec: &SignatureCodec,
        method: &str,
        path: &str,
        client_id: String,
        received: Option<String>,
    ) -> Self {
        let request_string = canonical_request(method, path);
        let computed = match codec.sign(&request_string, &client_id) {
            Ok(signature) => Some(signature),
            Err(e) => {
                warn!(error = %e, request = %request_string, "request signature unavailable");
                None
            }
        };

        Self {
            request_string,
            client_id,
            received: received.filter(|s| !s.trim().is_empty()),
            computed,
        }
    }

    /// Decide the signature step for this request.
    pub fn outcome(&self, codec: &SignatureCodec, mode: SignatureMode) -> SignatureOutcome {
        let Some(computed) = self.computed.as_ref() else {
            return SignatureOutcome::Unavailable;
        };

        match self.received.as_deref() {
            Some(received) if codec.verify(&self.request_string, received, &self.client_id) => {
                SignatureOutcome::Valid
            }
            Some(_) if mode == SignatureMode::Enforce => SignatureOutcome::Rejected,
            _ => SignatureOutcome::Issued(computed.clone()),
        }
    }

    /// Key under which a route's limiter tracks this caller.
    ///
    /// The resolved client id, not the per-endpoint signature, so every path
    /// and method under one route spends from the same bucket.
    pub fn limiter_key(&self) -> &str {
        &self.client_id
    }
}

use http::StatusCode;
use std::time::Duration;

/// Message used when neither the route nor the deployment configures one.
pub const DEFAULT_MESSAGE: &str = "Rate limit exceeded";

const INVALID_SIGNATURE_MESSAGE: &str = "Invalid request signature";

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Out of tokens, or retrying too quickly while out of tokens.
    RateLimited,
    /// Serving a lockout for repeated violations.
    Blocked,
    /// Presented a signature that does not match the request.
    InvalidSignature,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::RateLimited | Rejection::Blocked => StatusCode::TOO_MANY_REQUESTS,
            Rejection::InvalidSignature => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Result of an admission check. Rejection is an ordinary verdict, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub admitted: bool,
    /// Whole seconds until the limit is expected to reset. Zero when admitted.
    pub retry_after_secs: u64,
    /// Signature to return to the caller in the signature response header.
    pub signature_header: Option<String>,
    pub rejection: Option<Rejection>,
    message: Option<String>,
}

impl Verdict {
    pub fn admitted(signature_header: Option<String>) -> Self {
        Self {
            admitted: true,
            retry_after_secs: 0,
            signature_header,
            rejection: None,
            message: None,
        }
    }

    /// A 429 verdict. `message` gets the reset hint appended.
    pub fn rate_limited(
        rejection: Rejection,
        retry_after: Duration,
        signature_header: Option<String>,
        message: &str,
    ) -> Self {
        let retry_after_secs = ceil_secs(retry_after);
        Self {
            admitted: false,
            retry_after_secs,
            signature_header,
            rejection: Some(rejection),
            message: Some(format!(
                "{}. Limit will reset in {} seconds",
                message, retry_after_secs
            )),
        }
    }

    /// A 401 verdict for a signature that does not verify.
    pub fn invalid_signature() -> Self {
        Self {
            admitted: false,
            retry_after_secs: 0,
            signature_header: None,
            rejection: Some(Rejection::InvalidSignature),
            message: Some(INVALID_SIGNATURE_MESSAGE.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.rejection.map_or(StatusCode::OK, Rejection::status)
    }

    /// Human-readable body for a rejected request.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Round up to whole seconds so a pending wait is never reported as zero.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::RETRY_AFTER;
use http::{HeaderMap, HeaderValue, StatusCode};
use tollgate_admission::{RequestDescriptor, Verdict};
use tracing::warn;

use crate::state::SharedState;

/// Run every protected request through [`tollgate_admission::Admission::check`].
///
/// Admitted requests continue to the handler; rejected ones are answered here
/// with the verdict's status and message. Either way an issued signature is
/// returned in the signature header.
pub async fn admission_layer(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let descriptor = describe(&request);
    let verdict = state.admission.check(&descriptor);
    state.metrics.record(&verdict);

    let mut response = if verdict.admitted {
        next.run(request).await
    } else {
        reject(&verdict)
    };

    if let Some(signature) = verdict.signature_header.as_deref() {
        match HeaderValue::from_str(signature) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(state.signature_header.clone(), value);
            }
            Err(e) => warn!(error = %e, "issued signature is not a valid header value"),
        }
    }

    response
}

fn describe(request: &Request) -> RequestDescriptor {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let mut descriptor = RequestDescriptor::new(request.method().as_str(), request.uri().path());
    descriptor.headers = header_pairs(request.headers());
    descriptor.peer_addr = peer;
    descriptor
}

/// Headers with non-UTF-8 values are skipped.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn reject(verdict: &Verdict) -> Response {
    let status = verdict.status();
    let body = verdict.message().unwrap_or_default().to_string();
    let mut response = (status, [("content-type", "text/plain; charset=utf-8")], Body::from(body))
        .into_response();

    if status == StatusCode::TOO_MANY_REQUESTS {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(verdict.retry_after_secs));
    }
    response
}

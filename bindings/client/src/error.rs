use chain_tunnel_core::prelude::RequestFailure;

/// Longest response body excerpt carried in an HTTP failure message.
const MAX_ERROR_BODY: usize = 200;

/// Classify a transport error from the HTTP client.
pub(crate) fn request_failure(err: reqwest::Error) -> RequestFailure {
    if err.is_timeout() {
        RequestFailure::timeout(err.to_string())
    } else if let Some(status) = err.status() {
        RequestFailure::http(status.as_u16(), err.to_string())
    } else {
        // Connect, redirect, body and decode errors all mean there is no usable response
        RequestFailure::connection(err.to_string())
    }
}

/// A non-success status, with the reason and the start of the body as the message.
pub(crate) fn status_failure(status: reqwest::StatusCode, body: &str) -> RequestFailure {
    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    let excerpt = body.trim();
    if excerpt.is_empty() {
        return RequestFailure::http(status.as_u16(), reason);
    }

    let excerpt = match excerpt.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => format!("{}...", &excerpt[..end]),
        None => excerpt.to_string(),
    };
    RequestFailure::http(status.as_u16(), format!("{reason}: {excerpt}"))
}

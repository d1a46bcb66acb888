//! Shared HTTP plumbing for provider clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{GatewayError, GatewayResult};

/// Build an HTTP client with a per-request timeout.
pub(crate) fn build_client(timeout: Duration) -> GatewayResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::config(format!("failed to create HTTP client: {}", e)))
}

/// Normalize a configured base URL.
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// A response body kept both raw and parsed.
#[derive(Debug)]
pub(crate) struct RawBody<T> {
    pub parsed: T,
    pub raw: String,
}

/// Read the body of a response and classify non-success statuses.
///
/// - 401/403 → `Unauthorized`
/// - 429 and 5xx → `Unavailable` (retryable)
/// - other 4xx → `Rejected`, with the provider's `message` when present
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> GatewayResult<RawBody<T>> {
    let status = response.status();
    let raw = response.text().await?;

    if !status.is_success() {
        return Err(classify_status(status, raw, context));
    }

    let parsed = serde_json::from_str(&raw).map_err(|e| {
        warn!(context, error = %e, "Unparseable provider response");
        GatewayError::malformed(format!("{}: {}", context, e))
    })?;
    Ok(RawBody { parsed, raw })
}

pub(crate) fn classify_status(status: StatusCode, raw: String, context: &str) -> GatewayError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return GatewayError::Unauthorized(format!("{} returned {}", context, status));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return GatewayError::Unavailable {
            status: status.as_u16(),
            body: raw,
        };
    }
    let message = provider_message(&raw)
        .unwrap_or_else(|| format!("{} returned {}", context, status));
    GatewayError::rejected(message, raw)
}

/// Pull a human-readable `message` (or `description`) out of a JSON body.
pub(crate) fn provider_message(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    ["message", "description"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

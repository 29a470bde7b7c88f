//! Shared HTTP plumbing for the provider backends.

use crate::backend::LlmProvider;
use crate::error::LlmError;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// Builds the HTTP client used by one backend instance.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| LlmError::InvalidConfig {
            reason: format!("failed to build HTTP client: {e}"),
        })
}

/// Maps a transport-level failure.
pub(crate) fn transport_error(provider: LlmProvider, err: &reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else if err.is_connect() {
        LlmError::ProviderUnavailable {
            provider: provider.as_str().to_string(),
            reason: err.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            reason: err.to_string(),
        }
    }
}

/// Passes successful responses through and maps every other status to the
/// matching [`LlmError`].
pub(crate) async fn check_status(
    provider: LlmProvider,
    response: Response,
) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(status_error(provider, status, retry_after_secs, &body))
}

fn status_error(
    provider: LlmProvider,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> LlmError {
    let detail = truncate(body.trim(), 512);
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited { retry_after_secs }
    } else if status.is_server_error() {
        LlmError::ProviderUnavailable {
            provider: provider.as_str().to_string(),
            reason: format!("{status}: {detail}"),
        }
    } else {
        LlmError::RequestFailed {
            reason: format!("{} API error ({status}): {detail}", provider.as_str()),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

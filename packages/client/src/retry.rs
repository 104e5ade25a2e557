//! HTTP retry helpers for transient errors.
//!
//! Every API call goes through [`send_json`] rather than calling
//! `reqwest::RequestBuilder::send()` directly, so connection failures,
//! timeouts, rate limiting and server errors are retried with exponential
//! backoff. Retry counts are kept small: a dashboard would rather show
//! stale data and try again on the next refresh than block for minutes.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::ApiError;

/// Delay before the first retry; doubles on every further attempt.
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Maximum length of the response body preview included in errors.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and decodes the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// Retries up to `max_retries` times on connection errors, timeouts,
/// HTTP 429 and HTTP 5xx. Other 4xx responses are permanent. A body that
/// does not decode is not retried.
///
/// # Errors
///
/// Returns [`ApiError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body is not valid JSON
/// for `T`.
pub async fn send_json<T, F>(build_request: F, max_retries: u32) -> Result<T, ApiError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, max_retries).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        log::warn!(
            "JSON decode failed\n  url: {url}\n  error: {e}\n  body preview: {}",
            preview(&text)
        );
        ApiError::Json(e)
    })
}

/// Core retry loop. Returns the first successful (2xx/3xx) response.
async fn send_inner<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }
        let can_retry = attempt < max_retries;
        attempt += 1;

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) && can_retry => {
                log::warn!("  transient error: {e}");
                continue;
            }
            Err(e) => return Err(ApiError::Http(e)),
        };

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if can_retry {
                log::warn!("  HTTP {status} (retryable)");
                continue;
            }
            return Err(status_error(response).await);
        }

        if status.is_client_error() {
            return Err(status_error(response).await);
        }

        return Ok(response);
    }
}

async fn status_error(response: reqwest::Response) -> ApiError {
    let status = response.status();
    let message = match response.text().await {
        Ok(body) if !body.trim().is_empty() => preview(&body),
        _ => status.canonical_reason().unwrap_or("error").to_string(),
    };
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    BASE_DELAY.saturating_mul(1 << attempt.saturating_sub(1).min(6))
}

fn preview(text: &str) -> String {
    if text.chars().count() > BODY_PREVIEW_LEN {
        let head: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

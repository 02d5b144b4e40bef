use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProviderError;

const ERROR_BODY_CHARS: usize = 512;

pub(crate) fn build_client(provider: &'static str, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| ProviderError::Transport { provider, source })
}

/// Reads `response` as JSON, turning non-2xx statuses into [`ProviderError::Http`].
pub(crate) async fn response_json_or_error(
    provider: &'static str,
    response: Response,
) -> Result<Value, ProviderError> {
    let status = response.status();
    let retry_after = retry_after_hint(status, &response);
    let body = response
        .text()
        .await
        .map_err(|source| ProviderError::Transport { provider, source })?;
    if !status.is_success() {
        return Err(ProviderError::Http {
            provider,
            status: status.as_u16(),
            body: truncate_text(body.trim(), ERROR_BODY_CHARS),
            retry_after,
        });
    }
    let parsed: Value = serde_json::from_str(&body)
        .map_err(|err| ProviderError::invalid(provider, format!("invalid JSON payload: {err}")))?;
    if let Some(error) = parsed.get("error").filter(|error| !error.is_null()) {
        return Err(ProviderError::invalid(
            provider,
            format!("error payload: {}", truncate_text(&error.to_string(), ERROR_BODY_CHARS)),
        ));
    }
    Ok(parsed)
}

pub(crate) fn decode<T: DeserializeOwned>(provider: &'static str, value: Value) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|err| ProviderError::invalid(provider, err.to_string()))
}

fn retry_after_hint(status: StatusCode, response: &Response) -> Option<Duration> {
    if !matches!(status, StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE) {
        return None;
    }
    parse_retry_after(response.headers().get(RETRY_AFTER)?.to_str().ok()?)
}

/// Only the delta-seconds form is honored.
fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

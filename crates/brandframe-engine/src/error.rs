use std::time::Duration;

use brandframe_contracts::credentials::CredentialKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{credential} is missing; save one with `brandframe keys set` or export {env}")]
    MissingCredential {
        credential: CredentialKind,
        env: &'static str,
    },
    #[error("{provider} request failed ({status}): {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned an unusable payload: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} returned no text")]
    NoText { provider: &'static str },
    #[error("{provider} returned no inline image data")]
    NoImage { provider: &'static str },
    #[error("failed to fetch reference image {url}: {message}")]
    ReferenceImage { url: String, message: String },
    #[error("{provider} is misconfigured: {message}")]
    Config {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn missing(credential: CredentialKind) -> Self {
        ProviderError::MissingCredential {
            credential,
            env: credential.env_vars()[0],
        }
    }

    pub fn invalid(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider,
            message: message.into(),
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Transport { source, .. } => source.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Server-provided `Retry-After` hint, when the failure carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_key_and_env_var() {
        let err = ProviderError::missing(CredentialKind::Gemini);
        let message = err.to_string();
        assert!(message.contains("Gemini API key"));
        assert!(message.contains("GEMINI_API_KEY"));
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn http_errors_expose_status_and_hint() {
        let err = ProviderError::Http {
            provider: "upriver",
            status: 429,
            body: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.http_status(), Some(429));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.to_string(), "upriver request failed (429): slow down");
    }
}

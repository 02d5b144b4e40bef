use async_trait::async_trait;
use brandframe_contracts::brand::{
    AudienceInsights, AudienceInsightsRequest, BrandResearch, BrandResearchRequest,
    InsightCitations, ProductDetails, ProductDetailsRequest, ProductList, ProductsRequest,
};
use brandframe_contracts::credentials::{CredentialKind, Credentials};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::http::{build_client, decode, response_json_or_error};
use super::{require, BrandIntelligence};
use crate::config::EngineConfig;
use crate::error::ProviderError;
use crate::retry::{with_retry, RetryPolicy};

const PROVIDER: &str = "upriver";
const API_KEY_HEADER: &str = "X-API-Key";

/// HTTP client for the Upriver brand-intelligence API.
#[derive(Debug, Clone)]
pub struct UpriverClient {
    api_base: Url,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl UpriverClient {
    pub fn new(config: &EngineConfig) -> Result<Self, ProviderError> {
        let api_base = Url::parse(&config.upriver_api_base).map_err(|err| ProviderError::Config {
            provider: PROVIDER,
            message: format!("invalid api base {:?}: {err}", config.upriver_api_base),
        })?;
        if api_base.cannot_be_a_base() {
            return Err(ProviderError::Config {
                provider: PROVIDER,
                message: format!("api base {:?} cannot carry a path", config.upriver_api_base),
            });
        }
        Ok(Self {
            api_base,
            http: build_client(PROVIDER, config.request_timeout)?,
            retry: config.retry.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::Config {
                provider: PROVIDER,
                message: "api base cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        segments: &[&str],
        body: &Value,
    ) -> Result<T, ProviderError> {
        let api_key = require(credentials, CredentialKind::Upriver)?;
        let endpoint = self.endpoint(segments)?;
        debug!(endpoint = %endpoint, "upriver POST");

        let http = &self.http;
        let endpoint = &endpoint;
        let value = with_retry(&self.retry, endpoint.path(), move || async move {
            let response = http
                .post(endpoint.clone())
                .header(API_KEY_HEADER, api_key)
                .json(body)
                .send()
                .await
                .map_err(|source| ProviderError::Transport {
                    provider: PROVIDER,
                    source,
                })?;
            response_json_or_error(PROVIDER, response).await
        })
        .await?;
        decode(PROVIDER, value)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        segments: &[&str],
    ) -> Result<T, ProviderError> {
        let api_key = require(credentials, CredentialKind::Upriver)?;
        let endpoint = self.endpoint(segments)?;
        debug!(endpoint = %endpoint, "upriver GET");

        let http = &self.http;
        let endpoint = &endpoint;
        let value = with_retry(&self.retry, endpoint.path(), move || async move {
            let response = http
                .get(endpoint.clone())
                .header(API_KEY_HEADER, api_key)
                .send()
                .await
                .map_err(|source| ProviderError::Transport {
                    provider: PROVIDER,
                    source,
                })?;
            response_json_or_error(PROVIDER, response).await
        })
        .await?;
        decode(PROVIDER, value)
    }
}

/// Serializes `request` over a set of defaults; fields the request sets win.
fn body_with_defaults(request: &impl Serialize, defaults: Value) -> Result<Value, ProviderError> {
    let mut body = match defaults {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    match serde_json::to_value(request) {
        Ok(Value::Object(fields)) => body.extend(fields),
        Ok(other) => {
            return Err(ProviderError::invalid(
                PROVIDER,
                format!("request serialized to non-object {other}"),
            ))
        }
        Err(err) => return Err(ProviderError::invalid(PROVIDER, err.to_string())),
    }
    Ok(Value::Object(body))
}

fn check_subject(has_subject: bool) -> Result<(), ProviderError> {
    if has_subject {
        return Ok(());
    }
    Err(ProviderError::Config {
        provider: PROVIDER,
        message: "one of brand_url, brand_name or auto is required".to_string(),
    })
}

#[async_trait]
impl BrandIntelligence for UpriverClient {
    async fn brand_research(
        &self,
        credentials: &Credentials,
        request: &BrandResearchRequest,
    ) -> Result<BrandResearch, ProviderError> {
        check_subject(request.has_subject())?;
        let body = body_with_defaults(request, json!({"response_format": "json", "effort": "auto"}))?;
        self.post(credentials, &["v2", "brand", "research"], &body).await
    }

    async fn products(
        &self,
        credentials: &Credentials,
        request: &ProductsRequest,
    ) -> Result<ProductList, ProviderError> {
        check_subject(request.has_subject())?;
        let body = body_with_defaults(request, json!({"response_format": "json", "effort": "auto"}))?;
        self.post(credentials, &["v1", "brand", "products"], &body).await
    }

    async fn product_details(
        &self,
        credentials: &Credentials,
        request: &ProductDetailsRequest,
    ) -> Result<ProductDetails, ProviderError> {
        let body = body_with_defaults(request, json!({"effort": "low"}))?;
        self.post(credentials, &["v1", "brand", "product"], &body).await
    }

    async fn audience_insights(
        &self,
        credentials: &Credentials,
        request: &AudienceInsightsRequest,
    ) -> Result<AudienceInsights, ProviderError> {
        let body = body_with_defaults(request, json!({"citations_mode": "async"}))?;
        self.post(credentials, &["v2", "audience_insights"], &body).await
    }

    async fn insight_citations(
        &self,
        credentials: &Credentials,
        continuation_token: &str,
    ) -> Result<InsightCitations, ProviderError> {
        let token = continuation_token.trim();
        if token.is_empty() {
            return Err(ProviderError::Config {
                provider: PROVIDER,
                message: "continuation_token is required".to_string(),
            });
        }
        self.get(credentials, &["v2", "audience_insights", token, "citations"])
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::providers::test_server::{serve, Reply};

    fn client(base: &str) -> anyhow::Result<UpriverClient> {
        let config = EngineConfig {
            upriver_api_base: base.to_string(),
            retry: RetryPolicy {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                ..RetryPolicy::default()
            },
            ..EngineConfig::default()
        };
        Ok(UpriverClient::new(&config)?)
    }

    fn keys() -> Credentials {
        Credentials::new(Some("up-key".to_string()), None)
    }

    #[test]
    fn request_fields_override_defaults() -> anyhow::Result<()> {
        let body = body_with_defaults(
            &BrandResearchRequest::for_url("https://acme.com"),
            json!({"response_format": "json", "effort": "auto"}),
        )?;
        assert_eq!(
            body,
            json!({"brand_url": "https://acme.com", "response_format": "json", "effort": "auto"})
        );

        let insights = AudienceInsightsRequest {
            brief: "b".to_string(),
            citations_mode: Some("sync".to_string()),
            ..AudienceInsightsRequest::default()
        };
        let body = body_with_defaults(&insights, json!({"citations_mode": "async"}))?;
        assert_eq!(body["citations_mode"], "sync");
        Ok(())
    }

    #[test]
    fn citation_token_is_percent_encoded() -> anyhow::Result<()> {
        let client = client("https://api.upriver.ai/")?;
        let url = client.endpoint(&["v2", "audience_insights", "a/b c", "citations"])?;
        assert_eq!(
            url.as_str(),
            "https://api.upriver.ai/v2/audience_insights/a%2Fb%20c/citations"
        );
        Ok(())
    }

    #[test]
    fn rejects_unusable_api_base() {
        let config = EngineConfig {
            upriver_api_base: "mailto:ops@acme.com".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            UpriverClient::new(&config),
            Err(ProviderError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() -> anyhow::Result<()> {
        let client = client("http://127.0.0.1:9")?;
        let err = client
            .brand_research(&Credentials::default(), &BrandResearchRequest::for_url("https://acme.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingCredential {
                credential: CredentialKind::Upriver,
                ..
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn research_posts_json_with_api_key_header() -> anyhow::Result<()> {
        let server = serve(vec![Reply::json(200, json!({"brand": {"name": "Acme"}}))]).await?;
        let client = client(&server.base_url)?;

        let research = client
            .brand_research(&keys(), &BrandResearchRequest::for_url("https://acme.com"))
            .await?;
        assert_eq!(research.brand_name(), Some("Acme"));

        let requests = server.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/v2/brand/research");
        assert_eq!(requests[0].header("x-api-key"), Some("up-key"));
        let body: Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(body["brand_url"], "https://acme.com");
        assert_eq!(body["effort"], "auto");
        Ok(())
    }

    #[tokio::test]
    async fn rate_limited_request_is_retried() -> anyhow::Result<()> {
        let server = serve(vec![
            Reply::json(429, json!({"message": "slow down"})),
            Reply::json(200, json!({"citations": [{"text": "hi", "source": "reddit"}]})),
        ])
        .await?;
        let client = client(&server.base_url)?;

        let citations = client.insight_citations(&keys(), "tok-1").await?;
        assert_eq!(citations.citations.len(), 1);

        let requests = server.requests().await;
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|request| request.method == "GET"));
        assert_eq!(requests[1].path, "/v2/audience_insights/tok-1/citations");
        Ok(())
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() -> anyhow::Result<()> {
        let server = serve(vec![Reply::json(401, json!({"detail": "bad key"}))]).await?;
        let client = client(&server.base_url)?;

        let err = client
            .products(&keys(), &ProductsRequest::for_url("https://acme.com"))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), Some(401));
        assert!(err.to_string().contains("bad key"));
        assert_eq!(server.requests().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn request_without_subject_is_rejected_locally() -> anyhow::Result<()> {
        let client = client("http://127.0.0.1:9")?;
        let err = client
            .products(&keys(), &ProductsRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("brand_url, brand_name or auto"));
        Ok(())
    }
}

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use brandframe_contracts::brand::{ImageGenerationRequest, ImageResult};
use brandframe_contracts::credentials::{CredentialKind, Credentials};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::http::{build_client, response_json_or_error, truncate_text};
use super::{require, GenerativeAi};
use crate::config::EngineConfig;
use crate::error::ProviderError;
use crate::retry::{with_retry, RetryPolicy};

const PROVIDER: &str = "gemini";
const DEFAULT_OUTPUT_MIME: &str = "image/png";
const DEFAULT_REFERENCE_MIME: &str = "image/jpeg";

/// Client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_base: String,
    text_model: String,
    image_model: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(config: &EngineConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            http: build_client(PROVIDER, config.request_timeout)?,
            retry: config.retry.clone(),
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        payload: &Value,
    ) -> Result<Value, ProviderError> {
        let endpoint = self.endpoint_for_model(model);
        debug!(model, "gemini generateContent");

        let http = &self.http;
        let endpoint = endpoint.as_str();
        with_retry(&self.retry, model, move || async move {
            let response = http
                .post(endpoint)
                .query(&[("key", api_key)])
                .json(payload)
                .send()
                .await
                .map_err(|source| ProviderError::Transport {
                    provider: PROVIDER,
                    source,
                })?;
            response_json_or_error(PROVIDER, response).await
        })
        .await
    }

    /// Downloads a reference image as an inline part.
    async fn reference_part(&self, url: &str) -> Result<Value, ProviderError> {
        let failed = |message: String| ProviderError::ReferenceImage {
            url: url.to_string(),
            message,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| failed(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("status {status}")));
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_REFERENCE_MIME.to_string());
        let bytes = response.bytes().await.map_err(|err| failed(err.to_string()))?;
        Ok(json!({
            "inlineData": {
                "mimeType": mime_type,
                "data": BASE64.encode(&bytes),
            }
        }))
    }
}

fn default_safety_settings() -> Vec<Value> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| {
        json!({
            "category": category,
            "threshold": "OFF",
        })
    })
    .collect()
}

fn first_candidate_parts(payload: &Value) -> Vec<Value> {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn extract_text(payload: &Value) -> Option<String> {
    let text: String = first_candidate_parts(payload)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn extract_image(payload: &Value) -> Result<Option<ImageResult>, ProviderError> {
    for part in first_candidate_parts(payload) {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        BASE64
            .decode(data.as_bytes())
            .map_err(|err| ProviderError::invalid(PROVIDER, format!("image base64 decode failed: {err}")))?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_OUTPUT_MIME)
            .to_string();
        return Ok(Some(ImageResult {
            data_url: format!("data:{mime_type};base64,{data}"),
            mime_type,
        }));
    }
    Ok(None)
}

#[async_trait]
impl GenerativeAi for GeminiClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate_text(
        &self,
        credentials: &Credentials,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let api_key = require(credentials, CredentialKind::Gemini)?;
        let payload = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "safetySettings": default_safety_settings(),
        });
        let response = self
            .generate_content(api_key, &self.text_model, &payload)
            .await?;
        extract_text(&response).ok_or(ProviderError::NoText { provider: PROVIDER })
    }

    async fn generate_image(
        &self,
        credentials: &Credentials,
        request: &ImageGenerationRequest,
    ) -> Result<ImageResult, ProviderError> {
        let api_key = require(credentials, CredentialKind::Gemini)?;
        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(self.image_model.as_str());

        let mut parts = Vec::new();
        for url in &request.reference_image_urls {
            match self.reference_part(url).await {
                Ok(part) => parts.push(part),
                Err(err) => warn!(error = %err, "skipping reference image"),
            }
        }
        parts.push(json!({ "text": request.prompt }));

        let payload = json!({
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {"responseModalities": ["IMAGE"]},
            "safetySettings": default_safety_settings(),
        });
        let response = self.generate_content(api_key, model, &payload).await?;
        match extract_image(&response)? {
            Some(image) => Ok(image),
            None => {
                if let Some(text) = extract_text(&response) {
                    debug!(text = %truncate_text(&text, 200), "gemini replied without an image");
                }
                Err(ProviderError::NoImage { provider: PROVIDER })
            }
        }
    }
}

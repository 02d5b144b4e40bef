use std::env;
use std::time::Duration;

use brandframe_contracts::models::{Capability, ModelSelector};
use brandframe_contracts::prompts::ProductEmphasis;
use brandframe_contracts::url::BareNamePolicy;
use tracing::warn;

use crate::retry::RetryPolicy;

pub const DEFAULT_UPRIVER_API_BASE: &str = "https://api.upriver.ai";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

const DEFAULT_TIMEOUT_SECS: u64 = 90;
const MIN_TIMEOUT_SECS: u64 = 15;
const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub upriver_api_base: String,
    pub gemini_api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub emphasis: ProductEmphasis,
    pub bare_name_policy: BareNamePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upriver_api_base: DEFAULT_UPRIVER_API_BASE.to_string(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            emphasis: ProductEmphasis::default(),
            bare_name_policy: BareNamePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let base = |key: &str, fallback: String| {
            lookup(key)
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(fallback)
        };
        let request_timeout = lookup("BRANDFRAME_REQUEST_TIMEOUT_SECS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)))
            .unwrap_or(defaults.request_timeout);

        let mut config = Self {
            upriver_api_base: base("UPRIVER_API_BASE", defaults.upriver_api_base),
            gemini_api_base: base("GEMINI_API_BASE", defaults.gemini_api_base),
            request_timeout,
            ..Self::default()
        };
        config.set_text_model(lookup("BRANDFRAME_TEXT_MODEL").as_deref());
        config.set_image_model(lookup("BRANDFRAME_IMAGE_MODEL").as_deref());
        config
    }

    /// Resolves `requested` against the model registry; unknown names fall back.
    pub fn set_text_model(&mut self, requested: Option<&str>) {
        if let Some(model) = resolve_model(requested, Capability::Text) {
            self.text_model = model;
        }
    }

    pub fn set_image_model(&mut self, requested: Option<&str>) {
        if let Some(model) = resolve_model(requested, Capability::Image) {
            self.image_model = model;
        }
    }
}

fn resolve_model(requested: Option<&str>, capability: Capability) -> Option<String> {
    let requested = requested.map(str::trim).filter(|name| !name.is_empty())?;
    match ModelSelector::default().select(Some(requested), capability) {
        Ok(selection) => {
            if let Some(reason) = selection.fallback_reason.as_deref() {
                warn!(requested, model = %selection.model.name, "{reason}");
            }
            Some(selection.model.name)
        }
        Err(reason) => {
            warn!(requested, "{reason}");
            None
        }
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

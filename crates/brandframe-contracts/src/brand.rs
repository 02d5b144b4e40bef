//! Request and response shapes for the brand-intelligence and generative APIs.
//!
//! Upstream payloads are loosely versioned, so every response field is
//! defaulted: a missing key deserializes to `None`/empty rather than failing
//! the whole stage.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BrandResearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<String>,
}

impl BrandResearchRequest {
    pub fn for_url(brand_url: impl Into<String>) -> Self {
        Self {
            brand_url: Some(brand_url.into()),
            ..Self::default()
        }
    }

    /// True when at least one of `brand_url`, `brand_name` or `auto` is set.
    pub fn has_subject(&self) -> bool {
        [&self.brand_url, &self.brand_name, &self.auto]
            .iter()
            .any(|value| value.as_deref().is_some_and(|text| !text.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl ProductsRequest {
    pub fn for_url(brand_url: impl Into<String>) -> Self {
        Self {
            brand_url: Some(brand_url.into()),
            ..Self::default()
        }
    }

    pub fn has_subject(&self) -> bool {
        [&self.brand_url, &self.brand_name, &self.auto]
            .iter()
            .any(|value| value.as_deref().is_some_and(|text| !text.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductDetailsRequest {
    pub brand_name: String,
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BrandResearch {
    #[serde(default)]
    pub brand: Option<BrandProfile>,
    #[serde(default)]
    pub industries: Option<Vec<String>>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub audience: Option<BrandAudience>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub effort: Option<String>,
}

impl BrandResearch {
    pub fn brand_name(&self) -> Option<&str> {
        self.brand
            .as_ref()
            .and_then(|brand| brand.name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    pub fn audience_description(&self) -> Option<&str> {
        self.audience
            .as_ref()
            .and_then(|audience| audience.description.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BrandProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub identity: Option<BrandIdentity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BrandIdentity {
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub language: Option<BrandLanguage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BrandLanguage {
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub key_phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BrandAudience {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductList {
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub brand_url: Option<String>,
    #[serde(default)]
    pub products: Vec<ProductInfo>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// Prices arrive either as display strings (`"$24.00"`) or bare numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Amount(f64),
    Text(String),
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Amount(value) if value.fract() == 0.0 => write!(f, "{}", *value as i64),
            Price::Amount(value) => write!(f, "{value}"),
            Price::Text(text) => f.write_str(text),
        }
    }
}

impl Price {
    fn is_blank(&self) -> bool {
        match self {
            Price::Amount(value) => *value == 0.0,
            Price::Text(text) => text.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ProductDetails {
    pub fn first_image(&self) -> Option<&str> {
        self.images
            .iter()
            .map(|url| url.trim())
            .find(|url| !url.is_empty())
    }

    /// `"<price> <currency>"`, or `None` when no usable price was returned.
    pub fn display_price(&self) -> Option<String> {
        let price = self.price.as_ref().filter(|price| !price.is_blank())?;
        Some(match self.currency.as_deref().map(str::trim) {
            Some(currency) if !currency.is_empty() => format!("{price} {currency}"),
            _ => price.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudienceBrand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudienceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductSummary {
    pub category: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudienceInsightsRequest {
    pub brief: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industries: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<AudienceBrand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<AudienceDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<ProductSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InsightsMeta {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PersonalityTrait {
    #[serde(default, rename = "trait")]
    pub name: String,
    #[serde(default)]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Psychology {
    #[serde(default)]
    pub motivations: Vec<String>,
    #[serde(default)]
    pub barriers: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LanguagePatterns {
    #[serde(default)]
    pub common_phrases: Vec<String>,
    #[serde(default)]
    pub stylistic_features: Vec<String>,
    #[serde(default)]
    pub tone_descriptors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Persona {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality_traits: Vec<PersonalityTrait>,
    #[serde(default)]
    pub psychology: Option<Psychology>,
    #[serde(default)]
    pub language_patterns: Option<LanguagePatterns>,
    #[serde(default)]
    pub behaviors_demonstrated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Citation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudienceInsights {
    #[serde(default)]
    pub meta: Option<InsightsMeta>,
    #[serde(default)]
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub rollup_summary: Option<String>,
    #[serde(default)]
    pub continuation_token: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InsightCitations {
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub reference_image_urls: Vec<String>,
}

/// Final deliverable of a run: an inline `data:` URL and its mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub data_url: String,
    pub mime_type: String,
}

mod dryrun;
mod gemini;
mod http;
mod upriver;

use async_trait::async_trait;
use brandframe_contracts::brand::{
    AudienceInsights, AudienceInsightsRequest, BrandResearch, BrandResearchRequest,
    ImageGenerationRequest, ImageResult, InsightCitations, ProductDetails, ProductDetailsRequest,
    ProductList, ProductsRequest,
};
use brandframe_contracts::credentials::{CredentialKind, Credentials};

use crate::error::ProviderError;

pub use dryrun::DryrunGenerativeAi;
pub use gemini::GeminiClient;
pub use upriver::UpriverClient;

/// Brand research, catalog, audience and citation lookups.
#[async_trait]
pub trait BrandIntelligence: Send + Sync {
    async fn brand_research(
        &self,
        credentials: &Credentials,
        request: &BrandResearchRequest,
    ) -> Result<BrandResearch, ProviderError>;

    async fn products(
        &self,
        credentials: &Credentials,
        request: &ProductsRequest,
    ) -> Result<ProductList, ProviderError>;

    async fn product_details(
        &self,
        credentials: &Credentials,
        request: &ProductDetailsRequest,
    ) -> Result<ProductDetails, ProviderError>;

    async fn audience_insights(
        &self,
        credentials: &Credentials,
        request: &AudienceInsightsRequest,
    ) -> Result<AudienceInsights, ProviderError>;

    async fn insight_citations(
        &self,
        credentials: &Credentials,
        continuation_token: &str,
    ) -> Result<InsightCitations, ProviderError>;
}

/// Text and image generation.
#[async_trait]
pub trait GenerativeAi: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_text(
        &self,
        credentials: &Credentials,
        prompt: &str,
    ) -> Result<String, ProviderError>;

    async fn generate_image(
        &self,
        credentials: &Credentials,
        request: &ImageGenerationRequest,
    ) -> Result<ImageResult, ProviderError>;
}

/// Fails before any network traffic when `kind` has no key.
pub(crate) fn require(
    credentials: &Credentials,
    kind: CredentialKind,
) -> Result<&str, ProviderError> {
    credentials
        .get(kind)
        .ok_or_else(|| ProviderError::missing(kind))
}

//! Derivation of downstream request payloads from upstream stage results.

use crate::brand::{
    AudienceBrand, AudienceDescriptor, AudienceInsights, AudienceInsightsRequest, BrandResearch,
    ProductList, ProductSummary,
};

pub const DEFAULT_AUDIENCE_BRIEF: &str = "a campaign that raises brand awareness";

/// Builds the audience-insights request from whatever brand context is available.
///
/// A failed upstream stage is passed as `None` and contributes nothing.
pub fn build_audience_insights_payload(
    brand_research: Option<&BrandResearch>,
    products: Option<&ProductList>,
    brief: &str,
) -> AudienceInsightsRequest {
    let brief = match brief.trim() {
        "" => DEFAULT_AUDIENCE_BRIEF.to_string(),
        trimmed => trimmed.to_string(),
    };
    let mut payload = AudienceInsightsRequest {
        brief,
        ..AudienceInsightsRequest::default()
    };

    if let Some(research) = brand_research {
        if let Some(brand) = research.brand.as_ref() {
            payload.brand = Some(AudienceBrand {
                voice: brand.voice.clone(),
                values: (!brand.values.is_empty()).then(|| brand.values.clone()),
            });
        }

        payload.industries = match research.industries.as_ref() {
            Some(industries) if !industries.is_empty() => Some(industries.clone()),
            _ => research
                .brand
                .as_ref()
                .and_then(|brand| brand.industry.as_deref())
                .map(str::trim)
                .filter(|industry| !industry.is_empty())
                .map(|industry| vec![industry.to_string()]),
        };

        if let Some(description) = research.audience_description() {
            payload.audience = Some(AudienceDescriptor {
                age_range: None,
                description: Some(description.to_string()),
            });
        }
    }

    if let Some(list) = products.filter(|list| !list.products.is_empty()) {
        payload.products = Some(
            list.products
                .iter()
                .map(|product| ProductSummary {
                    category: product.category.clone(),
                    name: product.name.clone(),
                    description: product.description.clone(),
                })
                .collect(),
        );
    }

    payload
}

/// Token that licenses the follow-up citations lookup.
///
/// Newer responses nest it under `meta`; older ones put it at the top level.
pub fn extract_continuation_token(insights: Option<&AudienceInsights>) -> Option<String> {
    let insights = insights?;
    let nested = insights
        .meta
        .as_ref()
        .and_then(|meta| meta.continuation_token.as_deref());
    [nested, insights.continuation_token.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

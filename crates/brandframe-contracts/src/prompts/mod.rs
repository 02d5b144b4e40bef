mod image_generation;
mod product_selection;

use serde::{Deserialize, Serialize};

use crate::brand::{AudienceInsights, BrandResearch, InsightCitations, ProductDetails, ProductList};

pub use image_generation::build_image_generation_prompt;
pub use product_selection::build_product_selection_prompt;

/// How much weight the featured product gets in the rendered scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductEmphasis {
    /// Scene, people and environment lead; the product is a supporting detail.
    #[default]
    Secondary,
    /// The product must be the visual focal point of the image.
    FocalPoint,
}

/// Everything the image-generation prompt may draw on. Absent stages are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    #[serde(default)]
    pub brand_url: String,
    #[serde(default)]
    pub additional_instructions: Option<String>,
    #[serde(default)]
    pub brand_research: Option<BrandResearch>,
    #[serde(default)]
    pub products: Option<ProductList>,
    #[serde(default)]
    pub product_details: Option<ProductDetails>,
    #[serde(default)]
    pub audience_insights: Option<AudienceInsights>,
    #[serde(default)]
    pub audience_insights_citations: Option<InsightCitations>,
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

pub(crate) fn joined(items: &[String], limit: usize) -> Option<String> {
    let picked: Vec<&str> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .take(limit)
        .collect();
    (!picked.is_empty()).then(|| picked.join(", "))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prompt_context_reads_camel_case_requests() -> anyhow::Result<()> {
        let context: PromptContext = serde_json::from_value(json!({
            "brandUrl": "https://acme.com",
            "additionalInstructions": "autumn",
            "brandResearch": null,
            "productDetails": {"name": "Mug"}
        }))?;
        assert_eq!(context.brand_url, "https://acme.com");
        assert_eq!(context.additional_instructions.as_deref(), Some("autumn"));
        assert!(context.brand_research.is_none());
        assert_eq!(context.product_details.map(|details| details.name).as_deref(), Some("Mug"));
        Ok(())
    }

    #[test]
    fn joined_skips_blanks_and_limits() {
        let items = vec![
            "a".to_string(),
            " ".to_string(),
            "b".to_string(),
            "c".to_string(),
        ];
        assert_eq!(joined(&items, 2).as_deref(), Some("a, b"));
        assert_eq!(joined(&[], 3), None);
    }
}

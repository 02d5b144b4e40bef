//! Picks the featured product for a run.

use brandframe_contracts::brand::{BrandResearch, ProductInfo};
use brandframe_contracts::credentials::Credentials;
use brandframe_contracts::products::{ProductSelection, SelectionMethod, SelectionScores};
use brandframe_contracts::prompts::build_product_selection_prompt;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::error::ProviderError;
use crate::providers::GenerativeAi;

pub const ONLY_CANDIDATE_REASONING: &str = "only one available";

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("selected product {value:?} is not one of: {}", .available.join(", "))]
    Unmatched { value: String, available: Vec<String> },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("no products to choose from")]
    EmptyCatalog,
}

#[derive(Debug, Deserialize)]
struct SelectionReply {
    #[serde(
        alias = "selectedProductName",
        alias = "product_name",
        alias = "productName"
    )]
    selected_product_name: String,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    scores: Option<SelectionScores>,
}

/// Chooses one of `products`, asking `ai` only when there is a real choice.
pub async fn select_product(
    ai: &dyn GenerativeAi,
    credentials: &Credentials,
    products: &[ProductInfo],
    brand_research: Option<&BrandResearch>,
    brief: Option<&str>,
) -> Result<ProductSelection, SelectionError> {
    match products {
        [] => return Err(SelectionError::EmptyCatalog),
        [only] => {
            return Ok(ProductSelection {
                product: only.clone(),
                reasoning: ONLY_CANDIDATE_REASONING.to_string(),
                scores: None,
                method: SelectionMethod::OnlyCandidate,
            })
        }
        _ => {}
    }

    let prompt = build_product_selection_prompt(products, brand_research, brief);
    let raw = ai.generate_text(credentials, &prompt).await?;
    debug!(provider = ai.name(), chars = raw.len(), "selection reply received");

    let (product, reasoning, scores) = match parse_reply(&raw) {
        Some(reply) => {
            let product = match_product(products, &reply.selected_product_name)?;
            (product, reply.reasoning.unwrap_or_default(), reply.scores)
        }
        None => {
            let literal = raw.trim().trim_matches(|ch| ch == '"' || ch == '\'').trim();
            let product = exact_match(products, literal).ok_or_else(|| unmatched(products, literal))?;
            (product, String::new(), None)
        }
    };

    Ok(ProductSelection {
        product: product.clone(),
        reasoning,
        scores: scores.map(SelectionScores::clamped),
        method: SelectionMethod::Model,
    })
}

fn parse_reply(raw: &str) -> Option<SelectionReply> {
    let body = strip_code_fence(raw.trim());
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn exact_match<'a>(products: &'a [ProductInfo], name: &str) -> Option<&'a ProductInfo> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    products
        .iter()
        .find(|product| product.name.trim().to_lowercase() == needle)
}

fn match_product<'a>(
    products: &'a [ProductInfo],
    name: &str,
) -> Result<&'a ProductInfo, SelectionError> {
    if let Some(product) = exact_match(products, name) {
        return Ok(product);
    }
    let needle = name.trim().to_lowercase();
    if !needle.is_empty() {
        let contained = products.iter().find(|product| {
            let candidate = product.name.trim().to_lowercase();
            !candidate.is_empty() && (candidate.contains(&needle) || needle.contains(&candidate))
        });
        if let Some(product) = contained {
            return Ok(product);
        }
    }
    Err(unmatched(products, name))
}

fn unmatched(products: &[ProductInfo], value: &str) -> SelectionError {
    SelectionError::Unmatched {
        value: value.to_string(),
        available: products.iter().map(|product| product.name.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use brandframe_contracts::brand::{ImageGenerationRequest, ImageResult};

    use super::*;

    struct ScriptedText {
        reply: Mutex<Option<Result<String, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedText {
        fn replying(text: &str) -> Self {
            Self {
                reply: Mutex::new(Some(Ok(text.to_string()))),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Mutex::new(Some(Err(ProviderError::NoText { provider: "mock" }))),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerativeAi for ScriptedText {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate_text(
            &self,
            _credentials: &Credentials,
            _prompt: &str,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(ProviderError::NoText { provider: "mock" }))
        }

        async fn generate_image(
            &self,
            _credentials: &Credentials,
            _request: &ImageGenerationRequest,
        ) -> Result<ImageResult, ProviderError> {
            Err(ProviderError::NoImage { provider: "mock" })
        }
    }

    fn product(name: &str) -> ProductInfo {
        ProductInfo {
            name: name.to_string(),
            category: "Home".to_string(),
            description: String::new(),
            url: None,
        }
    }

    fn catalog() -> Vec<ProductInfo> {
        vec![product("Oak Stool"), product("Wool Throw Blanket"), product("Ceramic Vase")]
    }

    async fn select(ai: &ScriptedText, products: &[ProductInfo]) -> Result<ProductSelection, SelectionError> {
        select_product(ai, &Credentials::default(), products, None, Some("cozy winter")).await
    }

    #[tokio::test]
    async fn single_product_skips_the_model() -> anyhow::Result<()> {
        let ai = ScriptedText::replying("unused");
        let selection = select(&ai, &[product("Oak Stool")]).await?;
        assert_eq!(selection.product.name, "Oak Stool");
        assert_eq!(selection.reasoning, "only one available");
        assert_eq!(selection.method, SelectionMethod::OnlyCandidate);
        assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_catalog_is_an_error() {
        let ai = ScriptedText::replying("unused");
        assert!(matches!(select(&ai, &[]).await, Err(SelectionError::EmptyCatalog)));
        assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fenced_json_reply_is_parsed_and_scores_clamped() -> anyhow::Result<()> {
        let ai = ScriptedText::replying(
            "```json\n{\"selected_product_name\": \"ceramic vase\", \"reasoning\": \"Sculptural.\", \"scores\": {\"visualPotential\": 12, \"brand_alignment\": 8}}\n```",
        );
        let selection = select(&ai, &catalog()).await?;
        assert_eq!(selection.product.name, "Ceramic Vase");
        assert_eq!(selection.reasoning, "Sculptural.");
        assert_eq!(selection.method, SelectionMethod::Model);
        let scores = selection.scores.unwrap_or_default();
        assert_eq!(scores.visual_potential, Some(10.0));
        assert_eq!(scores.brand_alignment, Some(8.0));
        assert_eq!(scores.audience_appeal, None);
        assert_eq!(ai.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn substring_match_works_both_ways() -> anyhow::Result<()> {
        let ai = ScriptedText::replying("{\"selected_product_name\": \"Wool Throw\"}");
        assert_eq!(select(&ai, &catalog()).await?.product.name, "Wool Throw Blanket");

        let ai = ScriptedText::replying("{\"productName\": \"The Oak Stool (Furniture)\"}");
        assert_eq!(select(&ai, &catalog()).await?.product.name, "Oak Stool");
        Ok(())
    }

    #[tokio::test]
    async fn unknown_name_reports_available_products() {
        let ai = ScriptedText::replying("{\"selected_product_name\": \"Desk Lamp\"}");
        match select(&ai, &catalog()).await {
            Err(SelectionError::Unmatched { value, available }) => {
                assert_eq!(value, "Desk Lamp");
                assert_eq!(available.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_text_reply_is_matched_literally() -> anyhow::Result<()> {
        let ai = ScriptedText::replying("  \"Oak Stool\"\n");
        let selection = select(&ai, &catalog()).await?;
        assert_eq!(selection.product.name, "Oak Stool");
        assert!(selection.scores.is_none());

        let ai = ScriptedText::replying("I would pick the stool");
        assert!(matches!(
            select(&ai, &catalog()).await,
            Err(SelectionError::Unmatched { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn provider_failure_is_surfaced() {
        let ai = ScriptedText::failing();
        assert!(matches!(
            select(&ai, &catalog()).await,
            Err(SelectionError::Provider(ProviderError::NoText { .. }))
        ));
    }

    #[test]
    fn code_fence_without_language_is_stripped() {
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
    }
}

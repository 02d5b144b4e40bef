use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use brandframe_contracts::brand::{
    BrandResearch, BrandResearchRequest, ImageGenerationRequest, ImageResult, ProductDetailsRequest,
    ProductList, ProductsRequest,
};
use brandframe_contracts::credentials::{CredentialStore, Credentials};
use brandframe_contracts::payloads::{build_audience_insights_payload, extract_continuation_token};
use brandframe_contracts::products::{eligible_products, ProductSelection, SelectionMethod};
use brandframe_contracts::prompts::{build_image_generation_prompt, ProductEmphasis, PromptContext};
use brandframe_contracts::url::{normalize_brand_url, BareNamePolicy};
use brandframe_contracts::workflow::{
    StageName, StageOutcome, StageValue, WorkflowError, WorkflowRun,
};
use rand::Rng;
use tracing::{debug, info, warn};

use super::tracker::RunTracker;
use crate::config::EngineConfig;
use crate::observer::Observers;
use crate::providers::{BrandIntelligence, GenerativeAi};
use crate::selector::select_product;

/// Per-run knobs that do not belong to any single provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkflowOptions {
    pub emphasis: ProductEmphasis,
    pub bare_name_policy: BareNamePolicy,
    /// Overrides the generator's default image model when set.
    pub image_model: Option<String>,
}

impl From<&EngineConfig> for WorkflowOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            emphasis: config.emphasis,
            bare_name_policy: config.bare_name_policy,
            image_model: Some(config.image_model.clone()),
        }
    }
}

/// Runs the brand → image pipeline.
///
/// Enrichment stages (research, catalog, featured product, audience, citations)
/// degrade to "no data" on failure. The prompt and image stages end the run
/// with a [`WorkflowError`] when they fail.
pub struct Orchestrator {
    brand: Arc<dyn BrandIntelligence>,
    ai: Arc<dyn GenerativeAi>,
    credentials: Arc<dyn CredentialStore>,
    observers: Observers,
    options: WorkflowOptions,
    next_run_id: AtomicU64,
    latest_run_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        brand: Arc<dyn BrandIntelligence>,
        ai: Arc<dyn GenerativeAi>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            brand,
            ai,
            credentials,
            observers: Observers::new(),
            options: WorkflowOptions::default(),
            next_run_id: AtomicU64::new(0),
            latest_run_id: AtomicU64::new(0),
        }
    }

    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the pipeline and returns only the deliverable.
    pub async fn run(&self, brand_url_input: &str, brief: &str) -> Result<ImageResult, WorkflowError> {
        self.execute(brand_url_input, brief).await.into_result()
    }

    /// Runs the pipeline and returns the full run record, whatever the outcome.
    pub async fn execute(&self, brand_url_input: &str, brief: &str) -> WorkflowRun {
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest_run_id.fetch_max(run_id, Ordering::SeqCst);

        let normalized = normalize_brand_url(brand_url_input, self.options.bare_name_policy);
        let brief = brief.trim();
        let tracker = RunTracker::new(
            WorkflowRun::new(run_id, brand_url_input, normalized.clone(), brief),
            &self.observers,
            &self.latest_run_id,
        );
        tracker.announce();

        let credentials = match Credentials::snapshot(self.credentials.as_ref()) {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(run_id, error = %err, "credential store unreadable; using environment only");
                Credentials::from_env()
            }
        };
        debug!(run_id, ?credentials, "credentials loaded");

        if normalized.is_empty() {
            info!(run_id, "no brand url; skipping brand and audience enrichment");
            tracker.force_enrichment_complete();
        } else {
            self.enrich(&tracker, &credentials, &normalized, brief).await;
        }

        let context = tracker.read(|run| PromptContext {
            brand_url: run.normalized_brand_url.clone(),
            additional_instructions: non_blank(Some(brief)).map(str::to_string),
            brand_research: run.results.brand_research.clone(),
            products: run.results.products.clone(),
            product_details: run.results.product_details.clone(),
            audience_insights: run.results.audience_insights.clone(),
            audience_insights_citations: run.results.audience_insights_citations.clone(),
        });
        let prompt_request = build_image_generation_prompt(&context, self.options.emphasis);
        let prompt = stage(
            &tracker,
            StageName::Prompt,
            StageValue::Prompt,
            self.ai.generate_text(&credentials, &prompt_request),
        )
        .await;
        let prompt = match prompt {
            StageOutcome::Success(prompt) => prompt,
            StageOutcome::Failure(reason) => {
                tracker.fail(WorkflowError::Prompt(reason));
                return tracker.finish();
            }
        };

        let image_request = ImageGenerationRequest {
            prompt,
            model: self.options.image_model.clone(),
            reference_image_urls: context
                .product_details
                .as_ref()
                .and_then(|details| details.first_image())
                .map(str::to_string)
                .into_iter()
                .collect(),
        };
        let image = stage(
            &tracker,
            StageName::Image,
            StageValue::Image,
            self.ai.generate_image(&credentials, &image_request),
        )
        .await;
        if let StageOutcome::Failure(reason) = image {
            tracker.fail(WorkflowError::Image(reason));
        }
        tracker.finish()
    }

    async fn enrich(
        &self,
        tracker: &RunTracker<'_>,
        credentials: &Credentials,
        brand_url: &str,
        brief: &str,
    ) {
        let research_request = BrandResearchRequest::for_url(brand_url);
        let products_request = ProductsRequest::for_url(brand_url);
        let (research, products) = tokio::join!(
            stage(
                tracker,
                StageName::BrandResearch,
                StageValue::BrandResearch,
                self.brand.brand_research(credentials, &research_request),
            ),
            stage(
                tracker,
                StageName::Products,
                StageValue::Products,
                self.brand.products(credentials, &products_request),
            ),
        );
        let research = research.success();
        let products = products.success();

        tokio::join!(
            self.featured_product(tracker, credentials, research.as_ref(), products.as_ref(), brand_url, brief),
            self.audience(tracker, credentials, research.as_ref(), products.as_ref(), brief),
        );
    }

    async fn featured_product(
        &self,
        tracker: &RunTracker<'_>,
        credentials: &Credentials,
        research: Option<&BrandResearch>,
        products: Option<&ProductList>,
        brand_url: &str,
        brief: &str,
    ) {
        let Some(list) = products else {
            tracker.skip(StageName::ProductDetails);
            return;
        };
        let eligible = eligible_products(&list.products);
        if eligible.is_empty() {
            debug!(listed = list.products.len(), "no eligible products; skipping product details");
            tracker.skip(StageName::ProductDetails);
            return;
        }

        let selection = match select_product(
            self.ai.as_ref(),
            credentials,
            &eligible,
            research,
            non_blank(Some(brief)),
        )
        .await
        {
            Ok(selection) => selection,
            Err(err) => {
                let pick = rand::rng().random_range(0..eligible.len());
                warn!(error = %err, product = %eligible[pick].name, "product selection failed; picking at random");
                ProductSelection {
                    product: eligible[pick].clone(),
                    reasoning: format!("random pick after selection failure: {err}"),
                    scores: None,
                    method: SelectionMethod::RandomFallback,
                }
            }
        };
        info!(product = %selection.product.name, method = ?selection.method, "featured product selected");

        let request = ProductDetailsRequest {
            brand_name: detail_brand_name(research, list, brand_url),
            product_name: selection.product.name.clone(),
            product_url: selection.product.url.clone(),
        };
        tracker.record_selection(selection);
        stage(
            tracker,
            StageName::ProductDetails,
            StageValue::ProductDetails,
            self.brand.product_details(credentials, &request),
        )
        .await;
    }

    async fn audience(
        &self,
        tracker: &RunTracker<'_>,
        credentials: &Credentials,
        research: Option<&BrandResearch>,
        products: Option<&ProductList>,
        brief: &str,
    ) {
        let request = build_audience_insights_payload(research, products, brief);
        let insights = stage(
            tracker,
            StageName::AudienceInsights,
            StageValue::AudienceInsights,
            self.brand.audience_insights(credentials, &request),
        )
        .await
        .success();

        let Some(token) = extract_continuation_token(insights.as_ref()) else {
            debug!("no continuation token; skipping citations");
            tracker.skip(StageName::AudienceInsightsCitations);
            return;
        };
        stage(
            tracker,
            StageName::AudienceInsightsCitations,
            StageValue::AudienceInsightsCitations,
            self.brand.insight_citations(credentials, &token),
        )
        .await;
    }
}

/// Moves `stage` to loading, awaits `call`, then settles the stage with the outcome.
async fn stage<T, E>(
    tracker: &RunTracker<'_>,
    stage: StageName,
    wrap: fn(T) -> StageValue,
    call: impl Future<Output = Result<T, E>>,
) -> StageOutcome<T>
where
    T: Clone,
    E: fmt::Display,
{
    tracker.start(stage);
    let outcome = StageOutcome::from_result(call.await);
    tracker.settle(stage, outcome.as_ref().map(|value| wrap(value.clone())));
    outcome
}

/// Brand name for the product-details lookup: research, then catalog, then the host.
fn detail_brand_name(research: Option<&BrandResearch>, list: &ProductList, brand_url: &str) -> String {
    if let Some(name) = research.and_then(BrandResearch::brand_name) {
        return name.trim().to_string();
    }
    if let Some(name) = non_blank(list.brand_name.as_deref()) {
        return name.to_string();
    }
    let host = brand_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(brand_url)
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::status::{
    derive_composite_flags, CompositeFlag, CompositeFlags, InvalidTransition, StageName,
    StageStatus, StageStatusMap, DEPENDENT_STAGES,
};
use crate::brand::{
    AudienceInsights, BrandResearch, ImageResult, InsightCitations, ProductDetails, ProductList,
};
use crate::products::ProductSelection;

/// Tagged result of one stage: the payload on success, a reason on failure.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Success(T),
    Failure(String),
}

impl<T> StageOutcome<T> {
    pub fn from_result<E: fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => StageOutcome::Success(value),
            Err(err) => StageOutcome::Failure(err.to_string()),
        }
    }

    pub fn status(&self) -> StageStatus {
        match self {
            StageOutcome::Success(_) => StageStatus::Success,
            StageOutcome::Failure(_) => StageStatus::Error,
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            StageOutcome::Success(value) => Some(value),
            StageOutcome::Failure(_) => None,
        }
    }

    pub fn as_ref(&self) -> StageOutcome<&T> {
        match self {
            StageOutcome::Success(value) => StageOutcome::Success(value),
            StageOutcome::Failure(reason) => StageOutcome::Failure(reason.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            StageOutcome::Success(value) => StageOutcome::Success(f(value)),
            StageOutcome::Failure(reason) => StageOutcome::Failure(reason),
        }
    }
}

/// A successful stage payload, tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum StageValue {
    BrandResearch(BrandResearch),
    Products(ProductList),
    ProductDetails(ProductDetails),
    AudienceInsights(AudienceInsights),
    AudienceInsightsCitations(InsightCitations),
    Prompt(String),
    Image(ImageResult),
}

/// Payloads of the stages that succeeded. Failed and skipped stages stay `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageResults {
    pub brand_research: Option<BrandResearch>,
    pub products: Option<ProductList>,
    pub product_details: Option<ProductDetails>,
    pub audience_insights: Option<AudienceInsights>,
    pub audience_insights_citations: Option<InsightCitations>,
    pub prompt: Option<String>,
    pub image: Option<ImageResult>,
}

impl StageResults {
    fn store(&mut self, value: StageValue) {
        match value {
            StageValue::BrandResearch(value) => self.brand_research = Some(value),
            StageValue::Products(value) => self.products = Some(value),
            StageValue::ProductDetails(value) => self.product_details = Some(value),
            StageValue::AudienceInsights(value) => self.audience_insights = Some(value),
            StageValue::AudienceInsightsCitations(value) => {
                self.audience_insights_citations = Some(value)
            }
            StageValue::Prompt(value) => self.prompt = Some(value),
            StageValue::Image(value) => self.image = Some(value),
        }
    }
}

/// Unrecoverable failure of a run, surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "stage", content = "message", rename_all = "snake_case")]
pub enum WorkflowError {
    #[error("prompt generation failed: {0}")]
    Prompt(String),
    #[error("image generation failed: {0}")]
    Image(String),
}

impl WorkflowError {
    pub fn stage(&self) -> StageName {
        match self {
            WorkflowError::Prompt(_) => StageName::Prompt,
            WorkflowError::Image(_) => StageName::Image,
        }
    }
}

/// One applied status change plus the composite flags it flipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub stage: StageName,
    pub from: StageStatus,
    pub to: StageStatus,
    pub flipped: Vec<CompositeFlag>,
}

/// State of one pipeline execution. Created fresh per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: u64,
    pub brand_url_input: String,
    pub normalized_brand_url: String,
    pub brief: String,
    pub results: StageResults,
    /// Reasons for stages that ended in `error`, for logging.
    pub failures: BTreeMap<StageName, String>,
    pub statuses: StageStatusMap,
    pub flags: CompositeFlags,
    pub selection: Option<ProductSelection>,
    pub terminal_error: Option<WorkflowError>,
    /// Dependent stages whose branch has neither started nor skipped them yet.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    undecided: BTreeSet<StageName>,
}

impl WorkflowRun {
    pub fn new(
        run_id: u64,
        brand_url_input: impl Into<String>,
        normalized_brand_url: impl Into<String>,
        brief: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            brand_url_input: brand_url_input.into(),
            normalized_brand_url: normalized_brand_url.into(),
            brief: brief.into(),
            results: StageResults::default(),
            failures: BTreeMap::new(),
            statuses: StageStatusMap::default(),
            flags: CompositeFlags::default(),
            selection: None,
            terminal_error: None,
            undecided: DEPENDENT_STAGES.into_iter().collect(),
        }
    }

    pub fn status(&self, stage: StageName) -> StageStatus {
        self.statuses.get(stage)
    }

    pub fn start(&mut self, stage: StageName) -> Result<Transition, InvalidTransition> {
        let transition = self.advance(stage, StageStatus::Loading)?;
        self.undecided.remove(&stage);
        Ok(transition)
    }

    /// Records that `stage` will not run, letting the flags that wait on it settle.
    pub fn skip(&mut self, stage: StageName) -> Vec<CompositeFlag> {
        self.undecided.remove(&stage);
        self.flags
            .absorb(derive_composite_flags(&self.statuses, &self.undecided))
    }

    /// Settles `stage`. A failed stage keeps no payload, only its reason.
    pub fn settle(
        &mut self,
        stage: StageName,
        outcome: StageOutcome<StageValue>,
    ) -> Result<Transition, InvalidTransition> {
        let transition = self.advance(stage, outcome.status())?;
        match outcome {
            StageOutcome::Success(value) => self.results.store(value),
            StageOutcome::Failure(reason) => {
                self.failures.insert(stage, reason);
            }
        }
        Ok(transition)
    }

    /// Marks both enrichment flags complete for a run with no brand to research.
    pub fn force_enrichment_complete(&mut self) -> Vec<CompositeFlag> {
        self.flags.absorb(CompositeFlags {
            brand_product_details_complete: true,
            audience_insights_complete: true,
            ..CompositeFlags::default()
        })
    }

    pub fn fail(&mut self, error: WorkflowError) {
        self.terminal_error = Some(error);
    }

    pub fn into_result(self) -> Result<ImageResult, WorkflowError> {
        if let Some(error) = self.terminal_error {
            return Err(error);
        }
        self.results
            .image
            .ok_or_else(|| WorkflowError::Image("run finished without an image".to_string()))
    }

    fn advance(
        &mut self,
        stage: StageName,
        next: StageStatus,
    ) -> Result<Transition, InvalidTransition> {
        let from = self.statuses.advance(stage, next)?;
        let flipped = self.flags.absorb(derive_composite_flags(&self.statuses, &self.undecided));
        Ok(Transition {
            stage,
            from,
            to: next,
            flipped,
        })
    }
}

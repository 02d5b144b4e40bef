use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    BrandResearch,
    Products,
    ProductDetails,
    AudienceInsights,
    AudienceInsightsCitations,
    Prompt,
    Image,
}

impl StageName {
    pub const ALL: [StageName; 7] = [
        StageName::BrandResearch,
        StageName::Products,
        StageName::ProductDetails,
        StageName::AudienceInsights,
        StageName::AudienceInsightsCitations,
        StageName::Prompt,
        StageName::Image,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::BrandResearch => "brand_research",
            StageName::Products => "products",
            StageName::ProductDetails => "product_details",
            StageName::AudienceInsights => "audience_insights",
            StageName::AudienceInsightsCitations => "audience_insights_citations",
            StageName::Prompt => "prompt",
            StageName::Image => "image",
        }
    }

    /// Prompt and image failures end the run; every other stage is enrichment.
    pub fn is_fatal(self) -> bool {
        matches!(self, StageName::Prompt | StageName::Image)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    Loading,
    Success,
    Error,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::Loading => "loading",
            StageStatus::Success => "success",
            StageStatus::Error => "error",
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Error)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stage {stage} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub stage: StageName,
    pub from: StageStatus,
    pub to: StageStatus,
}

/// Status of every stage in a run. Stages only move forward:
/// `not_started -> loading -> success | error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageStatusMap(BTreeMap<StageName, StageStatus>);

impl Default for StageStatusMap {
    fn default() -> Self {
        Self(
            StageName::ALL
                .into_iter()
                .map(|stage| (stage, StageStatus::NotStarted))
                .collect(),
        )
    }
}

impl StageStatusMap {
    pub fn get(&self, stage: StageName) -> StageStatus {
        self.0.get(&stage).copied().unwrap_or_default()
    }

    /// Moves `stage` to `next`, returning the previous status.
    pub fn advance(
        &mut self,
        stage: StageName,
        next: StageStatus,
    ) -> Result<StageStatus, InvalidTransition> {
        let from = self.get(stage);
        let allowed = matches!(
            (from, next),
            (StageStatus::NotStarted, StageStatus::Loading)
                | (StageStatus::Loading, StageStatus::Success)
                | (StageStatus::Loading, StageStatus::Error)
        );
        if !allowed {
            return Err(InvalidTransition {
                stage,
                from,
                to: next,
            });
        }
        self.0.insert(stage, next);
        Ok(from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeFlag {
    BrandProductDetailsComplete,
    AudienceInsightsComplete,
    PromptBuilt,
    ImageGenerating,
}

impl CompositeFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            CompositeFlag::BrandProductDetailsComplete => "brand_product_details_complete",
            CompositeFlag::AudienceInsightsComplete => "audience_insights_complete",
            CompositeFlag::PromptBuilt => "prompt_built",
            CompositeFlag::ImageGenerating => "image_generating",
        }
    }
}

/// Coarse progress signals summarizing several stage statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompositeFlags {
    pub brand_product_details_complete: bool,
    pub audience_insights_complete: bool,
    pub prompt_built: bool,
    pub image_generating: bool,
}

impl CompositeFlags {
    pub fn get(&self, flag: CompositeFlag) -> bool {
        match flag {
            CompositeFlag::BrandProductDetailsComplete => self.brand_product_details_complete,
            CompositeFlag::AudienceInsightsComplete => self.audience_insights_complete,
            CompositeFlag::PromptBuilt => self.prompt_built,
            CompositeFlag::ImageGenerating => self.image_generating,
        }
    }

    fn set(&mut self, flag: CompositeFlag) {
        match flag {
            CompositeFlag::BrandProductDetailsComplete => self.brand_product_details_complete = true,
            CompositeFlag::AudienceInsightsComplete => self.audience_insights_complete = true,
            CompositeFlag::PromptBuilt => self.prompt_built = true,
            CompositeFlag::ImageGenerating => self.image_generating = true,
        }
    }

    /// Merges newly derived flags in. Flags only ever go from false to true;
    /// the return value lists the ones that flipped on this call.
    pub fn absorb(&mut self, derived: CompositeFlags) -> Vec<CompositeFlag> {
        let mut flipped = Vec::new();
        for flag in [
            CompositeFlag::BrandProductDetailsComplete,
            CompositeFlag::AudienceInsightsComplete,
            CompositeFlag::PromptBuilt,
            CompositeFlag::ImageGenerating,
        ] {
            if derived.get(flag) && !self.get(flag) {
                self.set(flag);
                flipped.push(flag);
            }
        }
        flipped
    }
}

/// Stages that only run when an earlier stage hands them something to do.
pub const DEPENDENT_STAGES: [StageName; 2] =
    [StageName::ProductDetails, StageName::AudienceInsightsCitations];

/// Computes the composite flags implied by `statuses`.
///
/// A dependent stage still in `undecided` blocks its flag even while
/// `not_started`: its branch may yet start it. Once skipped it counts as done.
pub fn derive_composite_flags(
    statuses: &StageStatusMap,
    undecided: &BTreeSet<StageName>,
) -> CompositeFlags {
    let status = |stage| statuses.get(stage);
    let resolved = |stage| match status(stage) {
        StageStatus::NotStarted => !undecided.contains(&stage),
        StageStatus::Loading => false,
        StageStatus::Success | StageStatus::Error => true,
    };
    CompositeFlags {
        brand_product_details_complete: status(StageName::BrandResearch).is_settled()
            && status(StageName::Products).is_settled()
            && resolved(StageName::ProductDetails),
        audience_insights_complete: status(StageName::AudienceInsights).is_settled()
            && resolved(StageName::AudienceInsightsCitations),
        prompt_built: status(StageName::Prompt) == StageStatus::Success,
        image_generating: status(StageName::Image) != StageStatus::NotStarted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(StageName, StageStatus)]) -> StageStatusMap {
        let mut statuses = StageStatusMap::default();
        for (stage, status) in entries {
            statuses.0.insert(*stage, *status);
        }
        statuses
    }

    #[test]
    fn stages_only_move_forward() {
        let mut statuses = StageStatusMap::default();
        assert_eq!(
            statuses.advance(StageName::Products, StageStatus::Loading),
            Ok(StageStatus::NotStarted)
        );
        assert_eq!(
            statuses.advance(StageName::Products, StageStatus::Success),
            Ok(StageStatus::Loading)
        );
        let err = statuses
            .advance(StageName::Products, StageStatus::Loading)
            .unwrap_err();
        assert_eq!(err.from, StageStatus::Success);
        assert_eq!(
            err.to_string(),
            "stage products cannot move from success to loading"
        );
        assert!(statuses
            .advance(StageName::Prompt, StageStatus::Success)
            .is_err());
        assert_eq!(statuses.get(StageName::Prompt), StageStatus::NotStarted);
    }

    fn decided() -> BTreeSet<StageName> {
        BTreeSet::new()
    }

    fn undecided(stage: StageName) -> BTreeSet<StageName> {
        BTreeSet::from([stage])
    }

    #[test]
    fn brand_flag_waits_for_both_fan_out_halves_and_details() {
        use StageName::*;
        use StageStatus::*;

        let only_one = map(&[(BrandResearch, Error), (Products, Loading)]);
        assert!(!derive_composite_flags(&only_one, &decided()).brand_product_details_complete);

        let settled = map(&[(BrandResearch, Error), (Products, Success)]);
        assert!(!derive_composite_flags(&settled, &undecided(ProductDetails)).brand_product_details_complete);
        assert!(derive_composite_flags(&settled, &decided()).brand_product_details_complete);

        let details_loading = map(&[(BrandResearch, Success), (Products, Success), (ProductDetails, Loading)]);
        assert!(!derive_composite_flags(&details_loading, &decided()).brand_product_details_complete);

        let details_done = map(&[(BrandResearch, Success), (Products, Success), (ProductDetails, Error)]);
        assert!(derive_composite_flags(&details_done, &decided()).brand_product_details_complete);
    }

    #[test]
    fn audience_flag_waits_until_citations_are_run_or_skipped() {
        use StageName::*;
        use StageStatus::*;

        let settled = map(&[(AudienceInsights, Success)]);
        assert!(!derive_composite_flags(&settled, &undecided(AudienceInsightsCitations)).audience_insights_complete);
        assert!(derive_composite_flags(&settled, &decided()).audience_insights_complete);

        let citing = map(&[(AudienceInsights, Success), (AudienceInsightsCitations, Loading)]);
        assert!(!derive_composite_flags(&citing, &decided()).audience_insights_complete);

        let cited = map(&[(AudienceInsights, Success), (AudienceInsightsCitations, Success)]);
        assert!(derive_composite_flags(&cited, &decided()).audience_insights_complete);

        let loading = map(&[(AudienceInsights, Loading)]);
        assert!(!derive_composite_flags(&loading, &decided()).audience_insights_complete);
    }

    #[test]
    fn prompt_and_image_flags() {
        use StageName::*;
        use StageStatus::*;

        let flags = derive_composite_flags(&map(&[(Prompt, Success), (Image, Loading)]), &decided());
        assert!(flags.prompt_built);
        assert!(flags.image_generating);

        let failed = derive_composite_flags(&map(&[(Prompt, Error)]), &decided());
        assert!(!failed.prompt_built);
        assert!(!failed.image_generating);
    }

    #[test]
    fn absorb_is_monotonic_and_reports_flips_once() {
        let mut flags = CompositeFlags::default();
        let derived = CompositeFlags {
            audience_insights_complete: true,
            ..CompositeFlags::default()
        };
        assert_eq!(flags.absorb(derived), vec![CompositeFlag::AudienceInsightsComplete]);
        assert!(flags.absorb(derived).is_empty());
        assert!(flags.absorb(CompositeFlags::default()).is_empty());
        assert!(flags.audience_insights_complete);
    }

    #[test]
    fn status_map_serializes_by_stage_name() -> anyhow::Result<()> {
        let value = serde_json::to_value(StageStatusMap::default())?;
        assert_eq!(value["audience_insights_citations"], "not_started");
        assert_eq!(value.as_object().map(|map| map.len()), Some(7));
        Ok(())
    }
}

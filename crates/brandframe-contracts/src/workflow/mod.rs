//! Stage status model and the per-run state record.

mod run;
mod status;

pub use run::{StageOutcome, StageResults, StageValue, Transition, WorkflowError, WorkflowRun};
pub use status::{
    derive_composite_flags, CompositeFlag, CompositeFlags, InvalidTransition, StageName,
    StageStatus, StageStatusMap, DEPENDENT_STAGES,
};

//! Pipeline orchestration over the provider traits.

mod orchestrator;
mod tracker;

pub use orchestrator::{Orchestrator, WorkflowOptions};

pub mod config;
pub mod error;
pub mod observer;
pub mod providers;
pub mod retry;
pub mod selector;
pub mod workflow;

pub use brandframe_contracts::workflow::WorkflowError;
pub use config::EngineConfig;
pub use error::ProviderError;
pub use observer::{EventLogObserver, Observers, RunObserver, TracingObserver};
pub use workflow::{Orchestrator, WorkflowOptions};

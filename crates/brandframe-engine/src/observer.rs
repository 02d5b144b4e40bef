use std::sync::Arc;

use brandframe_contracts::brand::ImageResult;
use brandframe_contracts::events::{EventWriter, RunEvent};
use brandframe_contracts::workflow::{
    CompositeFlag, CompositeFlags, StageName, StageStatus, WorkflowError, WorkflowRun,
};
use tracing::{debug, info, warn};

/// Receives the observable progress of a run.
///
/// Every method has an empty default so observers implement only what they need.
pub trait RunObserver: Send + Sync {
    fn run_started(&self, _run: &WorkflowRun) {}

    fn stage_changed(
        &self,
        _run_id: u64,
        _stage: StageName,
        _from: StageStatus,
        _to: StageStatus,
        _reason: Option<&str>,
    ) {
    }

    fn flags_changed(&self, _run_id: u64, _flipped: &[CompositeFlag], _flags: &CompositeFlags) {}

    fn run_finished(&self, _run_id: u64, _outcome: Result<&ImageResult, &WorkflowError>) {}
}

/// Logs every transition through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn run_started(&self, run: &WorkflowRun) {
        info!(
            run_id = run.run_id,
            brand_url = %run.normalized_brand_url,
            brief = %run.brief,
            "run started"
        );
    }

    fn stage_changed(
        &self,
        run_id: u64,
        stage: StageName,
        from: StageStatus,
        to: StageStatus,
        reason: Option<&str>,
    ) {
        match reason {
            Some(reason) => warn!(run_id, %stage, %from, %to, reason, "stage failed"),
            None => debug!(run_id, %stage, %from, %to, "stage status"),
        }
    }

    fn flags_changed(&self, run_id: u64, flipped: &[CompositeFlag], _flags: &CompositeFlags) {
        for flag in flipped {
            debug!(run_id, flag = flag.as_str(), "composite flag set");
        }
    }

    fn run_finished(&self, run_id: u64, outcome: Result<&ImageResult, &WorkflowError>) {
        match outcome {
            Ok(image) => info!(run_id, mime_type = %image.mime_type, "run finished"),
            Err(err) => warn!(run_id, stage = %err.stage(), error = %err, "run failed"),
        }
    }
}

/// Appends run events to a JSONL file.
#[derive(Debug, Clone)]
pub struct EventLogObserver {
    writer: EventWriter,
}

impl EventLogObserver {
    pub fn new(writer: EventWriter) -> Self {
        Self { writer }
    }

    fn write(&self, event: RunEvent) {
        if let Err(err) = self.writer.record(&event) {
            warn!(path = %self.writer.path().display(), error = %err, "failed to append run event");
        }
    }
}

impl RunObserver for EventLogObserver {
    fn run_started(&self, run: &WorkflowRun) {
        self.write(RunEvent::RunStarted {
            brand_url_input: run.brand_url_input.clone(),
            normalized_brand_url: run.normalized_brand_url.clone(),
            brief: run.brief.clone(),
        });
    }

    fn stage_changed(
        &self,
        _run_id: u64,
        stage: StageName,
        from: StageStatus,
        to: StageStatus,
        reason: Option<&str>,
    ) {
        self.write(RunEvent::StageChanged {
            stage,
            from,
            to,
            reason: reason.map(str::to_string),
        });
    }

    fn flags_changed(&self, _run_id: u64, flipped: &[CompositeFlag], flags: &CompositeFlags) {
        self.write(RunEvent::FlagsChanged {
            flipped: flipped.to_vec(),
            flags: *flags,
        });
    }

    fn run_finished(&self, _run_id: u64, outcome: Result<&ImageResult, &WorkflowError>) {
        let event = match outcome {
            Ok(image) => RunEvent::RunFinished {
                mime_type: image.mime_type.clone(),
            },
            Err(err) => RunEvent::RunFailed {
                stage: err.stage(),
                error: err.to_string(),
            },
        };
        self.write(event);
    }
}

/// Fans notifications out to several observers, in registration order.
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn RunObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn RunObserver>) {
        self.observers.push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl RunObserver for Observers {
    fn run_started(&self, run: &WorkflowRun) {
        for observer in &self.observers {
            observer.run_started(run);
        }
    }

    fn stage_changed(
        &self,
        run_id: u64,
        stage: StageName,
        from: StageStatus,
        to: StageStatus,
        reason: Option<&str>,
    ) {
        for observer in &self.observers {
            observer.stage_changed(run_id, stage, from, to, reason);
        }
    }

    fn flags_changed(&self, run_id: u64, flipped: &[CompositeFlag], flags: &CompositeFlags) {
        for observer in &self.observers {
            observer.flags_changed(run_id, flipped, flags);
        }
    }

    fn run_finished(&self, run_id: u64, outcome: Result<&ImageResult, &WorkflowError>) {
        for observer in &self.observers {
            observer.run_finished(run_id, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::Value;

    use super::*;

    #[test]
    fn event_log_observer_writes_one_line_per_notification() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let observer = EventLogObserver::new(EventWriter::new(&path, "7"));
        let run = WorkflowRun::new(7, "acme.com", "https://acme.com", "launch");

        observer.run_started(&run);
        observer.stage_changed(
            7,
            StageName::Products,
            StageStatus::Loading,
            StageStatus::Error,
            Some("upriver request failed (500): boom"),
        );
        observer.flags_changed(
            7,
            &[CompositeFlag::PromptBuilt],
            &CompositeFlags {
                prompt_built: true,
                ..CompositeFlags::default()
            },
        );
        observer.run_finished(7, Err(&WorkflowError::Image("no image".to_string())));

        let lines: Vec<Value> = fs::read_to_string(&path)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["type"], "run_started");
        assert_eq!(lines[0]["normalized_brand_url"], "https://acme.com");
        assert_eq!(lines[1]["type"], "stage_status");
        assert_eq!(lines[1]["stage"], "products");
        assert_eq!(lines[1]["to"], "error");
        assert_eq!(lines[2]["type"], "composite_flags");
        assert_eq!(lines[3]["type"], "run_failed");
        assert_eq!(lines[3]["stage"], "image");
        assert!(lines.iter().all(|line| line["run_id"] == "7"));
        Ok(())
    }

    #[test]
    fn observers_fan_out_in_order() {
        use std::sync::Mutex;

        struct Named(&'static str, Arc<Mutex<Vec<&'static str>>>);

        impl RunObserver for Named {
            fn run_started(&self, _run: &WorkflowRun) {
                self.1.lock().unwrap().push(self.0);
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let observers = Observers::new()
            .with(Arc::new(Named("first", Arc::clone(&seen))))
            .with(Arc::new(Named("second", Arc::clone(&seen))));
        observers.run_started(&WorkflowRun::new(1, "", "", ""));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }
}

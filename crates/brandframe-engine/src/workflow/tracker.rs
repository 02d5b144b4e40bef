use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use brandframe_contracts::products::ProductSelection;
use brandframe_contracts::workflow::{
    CompositeFlag, StageName, StageOutcome, StageValue, Transition, WorkflowError, WorkflowRun,
};
use tracing::{debug, error, warn};

use crate::observer::{Observers, RunObserver};

/// Owns the state of one run and publishes its transitions.
///
/// Notifications go out only while this run is the latest one started, so a
/// superseded run finishes quietly.
pub(crate) struct RunTracker<'a> {
    run: Mutex<WorkflowRun>,
    observers: &'a Observers,
    latest_run_id: &'a AtomicU64,
}

impl<'a> RunTracker<'a> {
    pub(crate) fn new(run: WorkflowRun, observers: &'a Observers, latest_run_id: &'a AtomicU64) -> Self {
        Self {
            run: Mutex::new(run),
            observers,
            latest_run_id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowRun> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_id(&self) -> u64 {
        self.lock().run_id
    }

    fn is_current(&self, run_id: u64) -> bool {
        self.latest_run_id.load(Ordering::SeqCst) == run_id
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&WorkflowRun) -> R) -> R {
        f(&self.lock())
    }

    pub(crate) fn announce(&self) {
        let run = self.lock().clone();
        if self.is_current(run.run_id) {
            self.observers.run_started(&run);
        }
    }

    pub(crate) fn start(&self, stage: StageName) {
        let applied = {
            let mut run = self.lock();
            run.start(stage).map(|transition| (run.run_id, transition))
        };
        match applied {
            Ok((run_id, transition)) => self.publish(run_id, transition, None),
            Err(err) => error!(%err, "ignored stage transition"),
        }
    }

    pub(crate) fn settle(&self, stage: StageName, outcome: StageOutcome<StageValue>) {
        let reason = match &outcome {
            StageOutcome::Failure(reason) => Some(reason.clone()),
            StageOutcome::Success(_) => None,
        };
        let applied = {
            let mut run = self.lock();
            run.settle(stage, outcome).map(|transition| (run.run_id, transition))
        };
        match applied {
            Ok((run_id, transition)) => {
                if let Some(reason) = reason.as_deref() {
                    if !stage.is_fatal() {
                        warn!(run_id, %stage, reason, "stage failed; continuing without it");
                    }
                }
                self.publish(run_id, transition, reason.as_deref());
            }
            Err(err) => error!(%err, "ignored stage transition"),
        }
    }

    pub(crate) fn skip(&self, stage: StageName) {
        let (run_id, flipped) = {
            let mut run = self.lock();
            (run.run_id, run.skip(stage))
        };
        debug!(run_id, %stage, "stage skipped");
        self.publish_flags(run_id, &flipped);
    }

    pub(crate) fn force_enrichment_complete(&self) {
        let (run_id, flipped) = {
            let mut run = self.lock();
            (run.run_id, run.force_enrichment_complete())
        };
        self.publish_flags(run_id, &flipped);
    }

    pub(crate) fn record_selection(&self, selection: ProductSelection) {
        self.lock().selection = Some(selection);
    }

    pub(crate) fn fail(&self, failure: WorkflowError) {
        let run_id = self.run_id();
        error!(run_id, stage = %failure.stage(), error = %failure, "run failed");
        self.lock().fail(failure);
    }

    pub(crate) fn finish(self) -> WorkflowRun {
        let run = self.run.into_inner().unwrap_or_else(PoisonError::into_inner);
        if self.latest_run_id.load(Ordering::SeqCst) == run.run_id {
            match (&run.terminal_error, &run.results.image) {
                (Some(failure), _) => self.observers.run_finished(run.run_id, Err(failure)),
                (None, Some(image)) => self.observers.run_finished(run.run_id, Ok(image)),
                (None, None) => {}
            }
        }
        run
    }

    fn publish(&self, run_id: u64, transition: Transition, reason: Option<&str>) {
        if !self.is_current(run_id) {
            return;
        }
        self.observers.stage_changed(
            run_id,
            transition.stage,
            transition.from,
            transition.to,
            reason,
        );
        self.publish_flags(run_id, &transition.flipped);
    }

    fn publish_flags(&self, run_id: u64, flipped: &[CompositeFlag]) {
        if flipped.is_empty() || !self.is_current(run_id) {
            return;
        }
        let flags = self.lock().flags;
        self.observers.flags_changed(run_id, flipped, &flags);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use brandframe_contracts::workflow::{CompositeFlags, StageStatus};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        transitions: Mutex<Vec<(StageName, StageStatus, StageStatus)>>,
        flags: Mutex<Vec<CompositeFlag>>,
    }

    impl RunObserver for Recorder {
        fn stage_changed(
            &self,
            _run_id: u64,
            stage: StageName,
            from: StageStatus,
            to: StageStatus,
            _reason: Option<&str>,
        ) {
            self.transitions.lock().unwrap().push((stage, from, to));
        }

        fn flags_changed(&self, _run_id: u64, flipped: &[CompositeFlag], _flags: &CompositeFlags) {
            self.flags.lock().unwrap().extend_from_slice(flipped);
        }
    }

    #[test]
    fn repeated_start_is_ignored_without_panicking() {
        let recorder = Arc::new(Recorder::default());
        let observers = Observers::new().with(recorder.clone());
        let latest = AtomicU64::new(1);
        let tracker = RunTracker::new(WorkflowRun::new(1, "", "", ""), &observers, &latest);

        tracker.start(StageName::Prompt);
        tracker.start(StageName::Prompt);
        tracker.settle(StageName::Prompt, StageOutcome::Success(StageValue::Prompt("p".to_string())));

        let transitions = recorder.transitions.lock().unwrap().clone();
        assert_eq!(
            transitions,
            vec![
                (StageName::Prompt, StageStatus::NotStarted, StageStatus::Loading),
                (StageName::Prompt, StageStatus::Loading, StageStatus::Success),
            ]
        );
        assert_eq!(*recorder.flags.lock().unwrap(), vec![CompositeFlag::PromptBuilt]);
        assert_eq!(tracker.finish().results.prompt.as_deref(), Some("p"));
    }

    #[test]
    fn superseded_run_stays_silent() {
        let recorder = Arc::new(Recorder::default());
        let observers = Observers::new().with(recorder.clone());
        let latest = AtomicU64::new(2);
        let tracker = RunTracker::new(WorkflowRun::new(1, "", "", ""), &observers, &latest);

        tracker.start(StageName::Prompt);
        tracker.force_enrichment_complete();

        assert!(recorder.transitions.lock().unwrap().is_empty());
        assert!(recorder.flags.lock().unwrap().is_empty());
        let run = tracker.finish();
        assert_eq!(run.status(StageName::Prompt), StageStatus::Loading);
        assert!(run.flags.audience_insights_complete);
    }
}

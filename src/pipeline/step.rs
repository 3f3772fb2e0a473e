use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    error::{Error, StepFailureKind},
    event::Event,
    locale::LocaleId,
    pipeline::control::RunControl,
    traits::{ContentEncoder, IdentityEncoder},
    writer::OutputTarget,
};

/// What a step hands to the next one.
#[derive(Debug)]
pub enum StepOutput {
    Forward(Event),
    /// Several events in place of the one received (a split text unit,
    /// inserted parts, ...). Each goes through the remaining steps in order.
    Expand(Vec<Event>),
    /// Nothing goes further down the pipeline for this event.
    Stop,
}

/// A unit of processing in a pipeline.
///
/// Steps receive every event of the batch in order, including the batch
/// and batch item boundaries, and keep their own per-run state.
pub trait Step: Send {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn handle_event(&mut self, event: Event, ctx: &mut StepContext) -> Result<StepOutput, Error>;

    /// Releases what the step holds. Called once when the pipeline is dropped.
    fn destroy(&mut self) {}
}

/// The batch item being processed.
#[derive(Debug, Clone)]
pub struct BatchItemInfo {
    /// Position in the batch, from 0.
    pub index: usize,
    pub name: String,
    pub source_locale: Option<LocaleId>,
    pub target_locales: Vec<LocaleId>,
    pub output: Option<OutputTarget>,
}

/// What a step may know about, and do to, the run it belongs to.
pub struct StepContext {
    pipeline_id: String,
    item: Option<BatchItemInfo>,
    control: RunControl,
    encoder: Arc<dyn ContentEncoder>,
}

impl StepContext {
    pub(crate) fn new(pipeline_id: &str, control: RunControl) -> Self {
        Self {
            pipeline_id: pipeline_id.to_string(),
            item: None,
            control,
            encoder: Arc::new(IdentityEncoder),
        }
    }

    pub(crate) fn enter_item(&mut self, item: BatchItemInfo, encoder: Arc<dyn ContentEncoder>) {
        self.item = Some(item);
        self.encoder = encoder;
    }

    pub(crate) fn leave_item(&mut self) {
        self.item = None;
        self.encoder = Arc::new(IdentityEncoder);
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// `None` outside of a batch item.
    pub fn item(&self) -> Option<&BatchItemInfo> {
        self.item.as_ref()
    }

    /// Encoder of the filter reading the current item.
    pub fn encoder(&self) -> Arc<dyn ContentEncoder> {
        Arc::clone(&self.encoder)
    }

    /// Asks the pipeline to stop after the current event.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.control.is_cancel_requested()
    }

    /// Starts a time budget for work the step does on the current event.
    pub fn deadline(&self, budget: Duration) -> Deadline {
        Deadline {
            started: Instant::now(),
            budget,
        }
    }
}

/// A time budget started by [`StepContext::deadline`].
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn expired(&self) -> bool {
        self.started.elapsed() > self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    /// Fails with a timeout of `step` once the budget is spent.
    pub fn check(&self, step: &str) -> Result<(), Error> {
        if self.expired() {
            return Err(Error::step_failure(
                step,
                StepFailureKind::Timeout,
                format!("exceeded {:?}", self.budget),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline() {
        let ctx = StepContext::new("p", RunControl::new());
        let generous = ctx.deadline(Duration::from_secs(60));
        assert!(generous.check("mt").is_ok());
        assert!(generous.remaining() > Duration::from_secs(1));

        let spent = ctx.deadline(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        let err = spent.check("mt").unwrap_err();
        assert!(matches!(
            err,
            Error::StepFailure {
                kind: StepFailureKind::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn test_cancel_from_step() {
        let control = RunControl::new();
        let ctx = StepContext::new("p", control.clone());
        assert!(ctx.item().is_none());
        ctx.cancel();
        assert!(control.is_cancel_requested());
        assert!(ctx.is_cancel_requested());
        assert_eq!(ctx.pipeline_id(), "p");
    }
}

use log::{debug, error, info, warn};

use crate::{
    document::RawDocument,
    error::Error,
    event::{Event, EventType, NestingValidator},
    filters::FilterRegistry,
    options::{NestingCheck, PipelineOptions},
    pipeline::{
        control::{PipelineState, RunControl},
        report::{BatchReport, ItemFailure, ItemReport, ItemStatus},
        step::{BatchItemInfo, Step, StepContext, StepOutput},
    },
    traits::{EventStream, Filter},
    writer::OutputTarget,
};

/// One input of a batch and where its output goes.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub raw: RawDocument,
    pub output: Option<OutputTarget>,
}

impl BatchItem {
    pub fn new(raw: RawDocument) -> Self {
        Self { raw, output: None }
    }

    pub fn with_output(mut self, output: OutputTarget) -> Self {
        self.output = Some(output);
        self
    }
}

/// A failed stage: step name (or `filter`) and its error.
type StageError = (String, Error);

enum ItemEnd {
    Completed,
    Failed(StageError),
    Cancelled,
}

/// Runs batches of documents through an ordered list of steps.
///
/// Every event goes through every step in order before the next event is
/// read. Each batch item is framed by `START_BATCH_ITEM` / `END_BATCH_ITEM`
/// and the whole batch by `START_BATCH` / `END_BATCH`.
///
/// A failure in a step or in the filter aborts the current item only: the
/// steps receive aborted end events for everything left open, so writers can
/// drop their partial output, and the next item is processed normally. A
/// badly nested item aborts the whole run.
pub struct Pipeline {
    options: PipelineOptions,
    steps: Vec<Box<dyn Step>>,
    filters: FilterRegistry,
    default_filter: Option<Box<dyn Filter>>,
    control: RunControl,
    context: StepContext,
    reports: Vec<ItemReport>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        let control = RunControl::new();
        let context = StepContext::new(&options.id, control.clone());
        Self {
            options,
            steps: Vec::new(),
            filters: FilterRegistry::new(),
            default_filter: None,
            control,
            context,
            reports: Vec::new(),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn ensure_not_running(&self, operation: &'static str) -> Result<(), Error> {
        match self.control.state() {
            state @ (PipelineState::BatchRunning | PipelineState::Paused) => {
                Err(Error::InvalidState {
                    operation,
                    state: state.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Appends a step. Steps cannot change while a batch runs.
    pub fn add_step(&mut self, step: impl Step + 'static) -> Result<(), Error> {
        self.ensure_not_running("add a step")?;
        self.steps.push(Box::new(step));
        Ok(())
    }

    pub fn insert_step(&mut self, position: usize, step: impl Step + 'static) -> Result<(), Error> {
        self.ensure_not_running("insert a step")?;
        if position > self.steps.len() {
            return Err(Error::InvalidPosition {
                position,
                len: self.steps.len(),
            });
        }
        self.steps.insert(position, Box::new(step));
        Ok(())
    }

    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn clear_steps(&mut self) -> Result<(), Error> {
        self.ensure_not_running("clear the steps")?;
        for step in &mut self.steps {
            step.destroy();
        }
        self.steps.clear();
        Ok(())
    }

    /// Names of the steps, in order.
    pub fn steps(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub fn set_filters(&mut self, filters: FilterRegistry) {
        self.filters = filters;
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    /// Filter used for items that name no filter and whose extension is not
    /// registered.
    pub fn set_filter(&mut self, filter: impl Filter + 'static) {
        self.default_filter = Some(Box::new(filter));
    }

    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.set_filter(filter);
        self
    }

    /// A handle to pause, resume or cancel the run from another thread.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.control.state()
    }

    pub fn pause(&self) -> Result<(), Error> {
        self.control.pause()
    }

    pub fn resume(&self) -> Result<(), Error> {
        self.control.resume()
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn start_batch(&mut self) -> Result<(), Error> {
        self.control.begin_batch()?;
        self.reports.clear();
        info!(
            "[{}] Batch started with steps: {}",
            self.options.id,
            self.steps().join(", ")
        );
        let mut last = None;
        if let Err((stage, err)) = self.send(Event::start_batch(), &mut last) {
            error!("[{}] Step `{}` failed on START_BATCH: {}", self.options.id, stage, err);
            self.control.set_state(PipelineState::Cancelled);
            return Err(err);
        }
        Ok(())
    }

    /// Runs one document through the steps.
    ///
    /// Item failures are reported in the returned [`ItemReport`]; an `Err`
    /// means the whole run was aborted.
    pub fn process(&mut self, item: BatchItem) -> Result<ItemReport, Error> {
        let index = self.reports.len();
        let name = item.raw.name.clone();
        match self.control.state() {
            PipelineState::BatchRunning | PipelineState::Paused => {}
            PipelineState::Cancelled => {
                return Ok(self.record(index, &name, ItemStatus::Skipped, None));
            }
            other => {
                return Err(Error::InvalidState {
                    operation: "process an item",
                    state: other.to_string(),
                });
            }
        }
        if self.control.checkpoint().is_err() {
            self.control.set_state(PipelineState::Cancelled);
            info!("[{}] Cancelled before item {} `{}`", self.options.id, index, name);
            return Ok(self.record(index, &name, ItemStatus::Skipped, None));
        }

        debug!("[{}] Processing item {} `{}`", self.options.id, index, name);
        let (mut filter, is_default) = match self.take_filter(&item.raw) {
            Ok(found) => found,
            Err(err) => {
                warn!("[{}] No filter for item `{}`: {}", self.options.id, name, err);
                let status = ItemStatus::Failed(ItemFailure::new("filter", &err));
                return Ok(self.record(index, &name, status, None));
            }
        };
        let outcome = self.run_item(filter.as_mut(), &item, index);
        filter.close();
        if is_default {
            self.default_filter = Some(filter);
        }
        self.context.leave_item();
        outcome
    }

    pub fn end_batch(&mut self) -> Result<BatchReport, Error> {
        let state = self.control.state();
        if !matches!(
            state,
            PipelineState::BatchRunning | PipelineState::Paused | PipelineState::Cancelled
        ) {
            return Err(Error::InvalidState {
                operation: "end a batch",
                state: state.to_string(),
            });
        }
        let mut last = None;
        if let Err((stage, err)) = self.send(Event::end_batch(), &mut last) {
            warn!("[{}] Step `{}` failed on END_BATCH: {}", self.options.id, stage, err);
        }
        let final_state =
            if state == PipelineState::Cancelled || self.control.is_cancel_requested() {
                PipelineState::Cancelled
            } else {
                PipelineState::BatchDone
            };
        self.control.set_state(final_state);
        let report = BatchReport {
            items: std::mem::take(&mut self.reports),
            state: final_state,
        };
        info!(
            "[{}] Batch {}: {} succeeded, {} failed, {} skipped",
            self.options.id,
            final_state,
            report.succeeded().count(),
            report.failed().count(),
            report.skipped().count()
        );
        Ok(report)
    }

    fn take_filter(&mut self, raw: &RawDocument) -> Result<(Box<dyn Filter>, bool), Error> {
        if raw.filter_id.is_some() {
            return Ok((self.filters.resolve(raw)?, false));
        }
        if let Some(filter) = raw.path().and_then(|path| self.filters.infer_from_path(path)) {
            return Ok((filter, false));
        }
        match self.default_filter.take() {
            Some(filter) => Ok((filter, true)),
            None => Err(Error::UnknownFilter(format!("no filter for `{}`", raw.name))),
        }
    }

    fn run_item(
        &mut self,
        filter: &mut dyn Filter,
        item: &BatchItem,
        index: usize,
    ) -> Result<ItemReport, Error> {
        let name = item.raw.name.as_str();
        let info = BatchItemInfo {
            index,
            name: name.to_string(),
            source_locale: item.raw.source_locale.clone(),
            target_locales: item.raw.target_locales.clone(),
            output: item.output.clone(),
        };
        self.context.enter_item(info, filter.encoder());

        let stream = match filter.open(&item.raw) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("[{}] Cannot open `{}`: {}", self.options.id, name, err);
                let status = ItemStatus::Failed(ItemFailure::new("filter", &err));
                return Ok(self.record(index, name, status, None));
            }
        };

        let events: EventStream<'_> = match self.options.nesting_check {
            NestingCheck::Prevalidate => {
                let mut validator = NestingValidator::new();
                let mut buffered = Vec::new();
                for next in stream {
                    match next {
                        Ok(event) => {
                            if let Err(err) = validator.push(&event) {
                                return self.abort_run(index, name, err);
                            }
                            buffered.push(event);
                        }
                        Err(err) => {
                            warn!("[{}] Filter failed on `{}`: {}", self.options.id, name, err);
                            let status = ItemStatus::Failed(ItemFailure::new("filter", &err));
                            return Ok(self.record(index, name, status, None));
                        }
                    }
                }
                if let Err(err) = validator.finish() {
                    return self.abort_run(index, name, err);
                }
                Box::new(buffered.into_iter().map(Ok::<Event, Error>))
            }
            NestingCheck::Streaming => stream,
        };

        let mut validator = NestingValidator::new();
        let mut last = None;
        let mut end = match self.send(Event::start_batch_item(), &mut last) {
            Ok(()) => ItemEnd::Completed,
            Err(failure) => ItemEnd::Failed(failure),
        };
        if matches!(end, ItemEnd::Completed) {
            for next in events {
                if self.control.checkpoint().is_err() {
                    end = ItemEnd::Cancelled;
                    break;
                }
                let event = match next {
                    Ok(event) => event,
                    Err(err) => {
                        end = ItemEnd::Failed(("filter".to_string(), err));
                        break;
                    }
                };
                if let Err(err) = validator.push(&event) {
                    self.send_aborted_ends(&validator, &mut last);
                    return self.abort_run(index, name, err);
                }
                if let Err(failure) = self.send(event, &mut last) {
                    end = ItemEnd::Failed(failure);
                    break;
                }
            }
        }
        if matches!(end, ItemEnd::Completed) {
            if let Err(err) = validator.finish() {
                self.send_aborted_ends(&validator, &mut last);
                return self.abort_run(index, name, err);
            }
            if let Err(failure) = self.send(Event::end_batch_item(), &mut last) {
                end = ItemEnd::Failed(failure);
            }
        } else {
            self.send_aborted_ends(&validator, &mut last);
        }

        let status = match end {
            ItemEnd::Completed => {
                debug!("[{}] Item {} `{}` done", self.options.id, index, name);
                ItemStatus::Succeeded
            }
            ItemEnd::Cancelled | ItemEnd::Failed((_, Error::CancellationRequested)) => {
                info!("[{}] Cancelled during item {} `{}`", self.options.id, index, name);
                self.control.set_state(PipelineState::Cancelled);
                ItemStatus::Cancelled
            }
            ItemEnd::Failed((stage, err)) => {
                warn!(
                    "[{}] Item {} `{}` failed in `{}`: {}",
                    self.options.id, index, name, stage, err
                );
                if self.control.is_cancel_requested() || !self.options.continue_on_failure {
                    self.control.cancel();
                    self.control.set_state(PipelineState::Cancelled);
                }
                ItemStatus::Failed(ItemFailure::new(&stage, &err))
            }
        };
        Ok(self.record(index, name, status, last))
    }

    /// Sends aborted end events for the frames left open, then the end of
    /// the item. Failures at this point are only logged.
    fn send_aborted_ends(&mut self, validator: &NestingValidator, last: &mut Option<Event>) {
        let mut pending: Vec<Event> = validator
            .open_frames()
            .into_iter()
            .map(|(event_type, id)| Event::aborted_end(event_type, &id))
            .collect();
        pending.push(Event::aborted_end(EventType::EndBatchItem, ""));
        warn!(
            "[{}] Closing aborted item with {} synthesized end event(s)",
            self.options.id,
            pending.len()
        );
        for event in pending {
            let event_type = event.event_type();
            if let Err((stage, err)) = self.send(event, last) {
                debug!(
                    "[{}] Step `{}` failed on aborted {}: {}",
                    self.options.id, stage, event_type, err
                );
            }
        }
    }

    fn abort_run(&mut self, index: usize, name: &str, err: Error) -> Result<ItemReport, Error> {
        error!("[{}] Aborting run on `{}`: {}", self.options.id, name, err);
        self.control.cancel();
        self.control.set_state(PipelineState::Cancelled);
        let status = ItemStatus::Failed(ItemFailure::new("nesting", &err));
        self.record(index, name, status, None);
        Err(err)
    }

    fn record(
        &mut self,
        index: usize,
        name: &str,
        status: ItemStatus,
        last_event: Option<Event>,
    ) -> ItemReport {
        let report = ItemReport {
            index,
            name: name.to_string(),
            status,
            last_event,
        };
        self.reports.push(report.clone());
        report
    }

    fn send(&mut self, event: Event, last: &mut Option<Event>) -> Result<(), StageError> {
        send_through(&mut self.steps, 0, event, &mut self.context, last)
    }
}

/// Passes `event` through `steps[from..]`, fanning out expanded events.
fn send_through(
    steps: &mut [Box<dyn Step>],
    from: usize,
    mut event: Event,
    ctx: &mut StepContext,
    last: &mut Option<Event>,
) -> Result<(), StageError> {
    let mut index = from;
    while index < steps.len() {
        let step = &mut steps[index];
        let output = step
            .handle_event(event, ctx)
            .map_err(|err| (step.name().to_string(), err))?;
        match output {
            StepOutput::Forward(next) => event = next,
            StepOutput::Stop => return Ok(()),
            StepOutput::Expand(events) => {
                for expanded in events {
                    send_through(steps, index + 1, expanded, ctx, last)?;
                }
                return Ok(());
            }
        }
        index += 1;
    }
    *last = Some(event);
    Ok(())
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        for step in &mut self.steps {
            step.destroy();
        }
    }
}

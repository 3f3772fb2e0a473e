//! Built-in pipeline steps.

use log::{debug, info};

use crate::{
    error::Error,
    event::{Event, EventType},
    locale::LocaleId,
    options::WriterOptions,
    pipeline::{Step, StepContext, StepOutput},
    resource::TargetCreation,
    traits::FilterWriter,
    writer::{FlushResult, GenericSkeletonWriter},
};

/// Writes each batch item to the output of its [`BatchItem`].
///
/// The document is committed on `END_DOCUMENT` and dropped when that event
/// is an aborted one. Items without an output are not written.
///
/// [`BatchItem`]: crate::pipeline::BatchItem
pub struct WriterStep<W: FilterWriter = GenericSkeletonWriter> {
    writer: W,
    options: WriterOptions,
    active: bool,
    flushes: Vec<FlushResult>,
}

impl WriterStep<GenericSkeletonWriter> {
    pub fn new(options: WriterOptions) -> Self {
        Self::with_writer(GenericSkeletonWriter::new(), options)
    }
}

impl<W: FilterWriter> WriterStep<W> {
    pub fn with_writer(writer: W, options: WriterOptions) -> Self {
        Self {
            writer,
            options,
            active: false,
            flushes: Vec::new(),
        }
    }

    /// Outputs committed since the step was created.
    pub fn flushes(&self) -> &[FlushResult] {
        &self.flushes
    }

    fn start_item(&mut self, ctx: &StepContext) {
        let Some(item) = ctx.item() else {
            self.active = false;
            return;
        };
        let Some(target) = item.output.clone() else {
            debug!("No output for `{}`, not writing it", item.name);
            self.active = false;
            return;
        };
        let mut options = self.options.clone();
        if options.target_locale.is_none() {
            options.target_locale = item.target_locales.first().cloned();
        }
        self.writer.set_output(target, options);
        self.writer.set_encoder(ctx.encoder());
        self.active = true;
    }
}

impl<W: FilterWriter> Step for WriterStep<W> {
    fn name(&self) -> &str {
        "writer"
    }

    fn description(&self) -> &str {
        "Rebuilds each document from its skeleton and writes it out."
    }

    fn handle_event(&mut self, event: Event, ctx: &mut StepContext) -> Result<StepOutput, Error> {
        if event.event_type() == EventType::StartBatchItem {
            self.start_item(ctx);
        }
        if !self.active {
            return Ok(StepOutput::Forward(event));
        }
        self.writer.handle(&event)?;
        match event.event_type() {
            EventType::EndDocument if !event.is_aborted() => {
                let flush = self.writer.close()?;
                info!("Wrote {} ({} bytes)", flush.target, flush.bytes_written);
                self.flushes.push(flush);
            }
            EventType::EndBatchItem => self.active = false,
            _ => {}
        }
        Ok(StepOutput::Forward(event))
    }

    fn destroy(&mut self) {
        self.writer.discard();
    }
}

/// Adds a target for one locale to every translatable text unit.
pub struct CreateTargetStep {
    locale: LocaleId,
    creation: TargetCreation,
    created: usize,
}

impl CreateTargetStep {
    pub fn new(locale: LocaleId) -> Self {
        Self {
            locale,
            creation: TargetCreation::default(),
            created: 0,
        }
    }

    pub fn with_creation(mut self, creation: TargetCreation) -> Self {
        self.creation = creation;
        self
    }

    /// Text units that did not have a target before this step.
    pub fn created(&self) -> usize {
        self.created
    }
}

impl Step for CreateTargetStep {
    fn name(&self) -> &str {
        "create-target"
    }

    fn description(&self) -> &str {
        "Creates a target for each translatable text unit."
    }

    fn handle_event(
        &mut self,
        mut event: Event,
        _ctx: &mut StepContext,
    ) -> Result<StepOutput, Error> {
        if let Some(unit) = event.text_unit_mut() {
            if unit.translatable {
                if !unit.has_target(&self.locale) {
                    self.created += 1;
                }
                unit.create_target(&self.locale, self.creation);
            }
        }
        Ok(StepOutput::Forward(event))
    }
}

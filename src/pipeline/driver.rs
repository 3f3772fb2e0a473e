use log::info;

use crate::{
    error::Error,
    pipeline::{
        control::RunControl,
        engine::{BatchItem, Pipeline},
        report::BatchReport,
    },
};

/// Runs a whole batch of items through a pipeline.
pub struct PipelineDriver {
    pipeline: Pipeline,
    items: Vec<BatchItem>,
}

impl PipelineDriver {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: BatchItem) {
        self.items.push(item);
    }

    pub fn with_item(mut self, item: BatchItem) -> Self {
        self.add_item(item);
        self
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn clear_items(&mut self) {
        self.items.clear();
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn control(&self) -> RunControl {
        self.pipeline.control()
    }

    /// Processes every item in order between one `START_BATCH` and one
    /// `END_BATCH`.
    ///
    /// Failed items are in the report. When the run itself is aborted the
    /// remaining items are skipped, `END_BATCH` is still sent, and the error
    /// is returned.
    pub fn process_batch(&mut self) -> Result<BatchReport, Error> {
        info!(
            "[{}] Processing {} item(s)",
            self.pipeline.options().id,
            self.items.len()
        );
        self.pipeline.start_batch()?;
        let mut fatal = None;
        for item in &self.items {
            if let Err(err) = self.pipeline.process(item.clone()) {
                if fatal.is_none() {
                    fatal = Some(err);
                }
            }
        }
        let report = self.pipeline.end_batch()?;
        match fatal {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }
}

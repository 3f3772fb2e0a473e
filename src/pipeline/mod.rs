//! The synchronous pipeline engine.

pub mod control;
pub mod driver;
pub mod engine;
pub mod report;
pub mod step;

pub use control::{PipelineState, RunControl};
pub use driver::PipelineDriver;
pub use engine::{BatchItem, Pipeline};
pub use report::{BatchReport, ItemFailure, ItemReport, ItemStatus};
pub use step::{BatchItemInfo, Deadline, Step, StepContext, StepOutput};

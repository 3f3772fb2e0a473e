use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, StepFailureKind},
    event::Event,
    pipeline::control::PipelineState,
};

/// Where and why a batch item failed, enough to retry it on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Step name, or `filter` when reading the input failed.
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub kind: Option<StepFailureKind>,
    pub message: String,
}

impl ItemFailure {
    pub(crate) fn new(stage: &str, error: &Error) -> Self {
        let (kind, message) = match error {
            Error::StepFailure { kind, message, .. } => (Some(*kind), message.clone()),
            other => (None, other.to_string()),
        };
        Self {
            stage: stage.to_string(),
            kind,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Failed(ItemFailure),
    /// Interrupted by a cancellation request.
    Cancelled,
    /// Not processed because the run had been cancelled.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub index: usize,
    pub name: String,
    pub status: ItemStatus,
    /// The last event that came out of the last step.
    #[serde(skip)]
    pub last_event: Option<Event>,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Succeeded
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        match &self.status {
            ItemStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    pub state: PipelineState,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|item| item.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|item| item.failure().is_some())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Skipped)
    }

    pub fn is_complete_success(&self) -> bool {
        self.state == PipelineState::BatchDone && self.items.iter().all(ItemReport::is_success)
    }
}

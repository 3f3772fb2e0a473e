//! All error types for the skeletext crate.
//!
//! These are returned from every fallible operation: coded-text mutation,
//! event construction, skeleton resolution, filtering, writing and pipeline
//! control.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a step gave up on the current batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFailureKind {
    /// The step exceeded its own deadline.
    Timeout,
    /// An external process or service invoked by the step failed.
    ExternalToolError,
    /// The step refused to transform the resource it was given.
    TransformRejected,
}

impl Display for StepFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepFailureKind::Timeout => write!(f, "timeout"),
            StepFailureKind::ExternalToolError => write!(f, "external tool error"),
            StepFailureKind::TransformRejected => write!(f, "transform rejected"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed code sequence: {0}")]
    MalformedCodeSequence(String),

    #[error("invalid position {position} (coded text length is {len})")]
    InvalidPosition { position: usize, len: usize },

    #[error("unresolved skeleton reference `{reference}` in resource `{resource}`")]
    UnresolvedSkeletonReference { resource: String, reference: String },

    #[error("cyclic skeleton reference through resource `{0}`")]
    CyclicSkeletonReference(String),

    #[error("unbalanced nesting: {0}")]
    UnbalancedNesting(String),

    #[error("step `{step}` failed ({kind}): {message}")]
    StepFailure {
        step: String,
        kind: StepFailureKind,
        message: String,
    },

    #[error("cancellation requested")]
    CancellationRequested,

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("cannot {operation} in state `{state}`")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("invalid locale `{0}`")]
    InvalidLocale(String),

    #[error("unknown filter `{0}`")]
    UnknownFilter(String),

    #[error("invalid inline code pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates a step failure error.
    pub fn step_failure(
        step: impl Into<String>,
        kind: StepFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Error::StepFailure {
            step: step.into(),
            kind,
            message: message.into(),
        }
    }

    /// Creates a malformed code sequence error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedCodeSequence(message.into())
    }

    /// Creates an unresolved skeleton reference error.
    pub fn unresolved(resource: impl Into<String>, reference: impl Into<String>) -> Self {
        Error::UnresolvedSkeletonReference {
            resource: resource.into(),
            reference: reference.into(),
        }
    }

    /// Returns `true` when the error invalidates the whole pipeline run rather
    /// than the current batch item.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Error::UnbalancedNesting(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_step_failure_display() {
        let error = Error::step_failure("mt", StepFailureKind::Timeout, "no answer after 5s");
        assert_eq!(
            error.to_string(),
            "step `mt` failed (timeout): no answer after 5s"
        );
    }

    #[test]
    fn test_unresolved_display() {
        let error = Error::unresolved("tu1", "title");
        assert_eq!(
            error.to_string(),
            "unresolved skeleton reference `title` in resource `tu1`"
        );
    }

    #[test]
    fn test_invalid_state_display() {
        let error = Error::InvalidState {
            operation: "start a batch",
            state: "batch running".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "cannot start a batch in state `batch running`"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let error: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(error.to_string().contains("I/O error"));
    }

    #[test]
    fn test_only_nesting_is_fatal_to_run() {
        assert!(Error::UnbalancedNesting("x".to_string()).is_fatal_to_run());
        assert!(!Error::malformed("x").is_fatal_to_run());
        assert!(!Error::unresolved("a", "b").is_fatal_to_run());
        assert!(
            !Error::step_failure("s", StepFailureKind::TransformRejected, "no").is_fatal_to_run()
        );
        assert!(!Error::CancellationRequested.is_fatal_to_run());
    }

    #[test]
    fn test_error_debug() {
        let error = Error::UnknownFilter("okf_html".to_string());
        let debug = format!("{:?}", error);
        assert!(debug.contains("UnknownFilter"));
        assert!(debug.contains("okf_html"));
    }
}

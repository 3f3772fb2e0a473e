use std::{
    fmt::{self, Display},
    sync::Arc,
};

use log::info;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    BatchRunning,
    Paused,
    BatchDone,
    Cancelled,
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::BatchRunning => write!(f, "batch running"),
            PipelineState::Paused => write!(f, "paused"),
            PipelineState::BatchDone => write!(f, "batch done"),
            PipelineState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug)]
struct ControlState {
    state: PipelineState,
    cancel_requested: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ControlState>,
    changed: Condvar,
}

/// Handle for pausing, resuming and cancelling a running pipeline from
/// another thread.
///
/// Requests take effect between events: a step handling an event is never
/// interrupted.
#[derive(Debug, Clone)]
pub struct RunControl {
    shared: Arc<Shared>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControlState {
                    state: PipelineState::Idle,
                    cancel_requested: false,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state.lock().state
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.state.lock().cancel_requested
    }

    /// Suspends the run before its next event.
    pub fn pause(&self) -> Result<(), Error> {
        let mut guard = self.shared.state.lock();
        match guard.state {
            PipelineState::BatchRunning => {
                guard.state = PipelineState::Paused;
                info!("Pause requested");
                Ok(())
            }
            PipelineState::Paused => Ok(()),
            other => Err(Error::InvalidState {
                operation: "pause",
                state: other.to_string(),
            }),
        }
    }

    pub fn resume(&self) -> Result<(), Error> {
        let mut guard = self.shared.state.lock();
        match guard.state {
            PipelineState::Paused => {
                guard.state = PipelineState::BatchRunning;
                self.shared.changed.notify_all();
                info!("Resumed");
                Ok(())
            }
            PipelineState::BatchRunning => Ok(()),
            other => Err(Error::InvalidState {
                operation: "resume",
                state: other.to_string(),
            }),
        }
    }

    /// Requests cancellation. A running batch stops at the next event
    /// boundary; an idle pipeline becomes cancelled at once.
    pub fn cancel(&self) {
        let mut guard = self.shared.state.lock();
        guard.cancel_requested = true;
        if matches!(guard.state, PipelineState::Idle | PipelineState::BatchDone) {
            guard.state = PipelineState::Cancelled;
        }
        self.shared.changed.notify_all();
    }

    pub(crate) fn set_state(&self, state: PipelineState) {
        self.shared.state.lock().state = state;
        self.shared.changed.notify_all();
    }

    pub(crate) fn begin_batch(&self) -> Result<(), Error> {
        let mut guard = self.shared.state.lock();
        match guard.state {
            PipelineState::Idle | PipelineState::BatchDone | PipelineState::Cancelled => {
                guard.state = PipelineState::BatchRunning;
                guard.cancel_requested = false;
                Ok(())
            }
            other => Err(Error::InvalidState {
                operation: "start a batch",
                state: other.to_string(),
            }),
        }
    }

    /// Blocks while paused. Fails when cancellation was requested.
    pub(crate) fn checkpoint(&self) -> Result<(), Error> {
        let mut guard = self.shared.state.lock();
        while guard.state == PipelineState::Paused && !guard.cancel_requested {
            self.shared.changed.wait(&mut guard);
        }
        if guard.cancel_requested {
            return Err(Error::CancellationRequested);
        }
        Ok(())
    }
}

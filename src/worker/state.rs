//! Worker lifecycle state and the status record published to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

/// Lifecycle state of a connection worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, not yet started.
    Created,
    /// Opening the connection.
    Connecting,
    /// Service loop is running.
    Running,
    /// Stop requested; waiting for the loop to exit.
    Stopping,
    /// Stopped cleanly and the connection is closed.
    Closed,
    /// Connect or I/O failure; the connection is closed.
    Failed,
}

impl WorkerState {
    /// Whether no further transition can leave this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Connecting)
                | (Self::Connecting, Self::Running | Self::Failed)
                | (Self::Running, Self::Stopping | Self::Failed)
                | (Self::Stopping, Self::Closed | Self::Failed)
        )
    }
}

/// Snapshot of a worker's state and the most recent loop error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerStatus {
    /// Current lifecycle state.
    pub state: WorkerState,
    /// Error that moved the worker to [`WorkerState::Failed`], if any.
    pub last_error: Option<String>,
    /// When `state` last changed.
    pub changed_at: DateTime<Utc>,
}

impl WorkerStatus {
    pub(crate) fn created() -> Self {
        Self {
            state: WorkerState::Created,
            last_error: None,
            changed_at: Utc::now(),
        }
    }
}

/// Move the published status to `next`, recording `error` when given.
///
/// Returns `false` and leaves the status untouched if the transition is not
/// allowed from the current state.
pub(crate) fn transition(
    status: &watch::Sender<WorkerStatus>,
    next: WorkerState,
    error: Option<String>,
) -> bool {
    let mut applied = false;
    status.send_if_modified(|current| {
        if !current.state.can_transition_to(next) {
            return false;
        }
        let previous = current.state;
        current.state = next;
        current.changed_at = Utc::now();
        if error.is_some() {
            current.last_error.clone_from(&error);
        }
        info!(from = ?previous, to = ?next, "worker state changed");
        applied = true;
        true
    });

    if !applied {
        let current = status.borrow().state;
        if current != next {
            warn!(from = ?current, to = ?next, "ignoring invalid worker state transition");
        }
    }
    applied
}

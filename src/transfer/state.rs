//! Transfer FSM State Definitions
//!
//! State names are the kebab-case strings stored in the durable transfer log.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transfer FSM States
///
/// `Idle` is the implicit state when no record exists and is never persisted.
/// Terminal states: `Committed`, `RolledBack`, `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferState {
    /// No transfer in flight
    Idle,

    /// Document validated, snapshot being logged
    Preparing,

    /// Snapshot durably logged - nothing mutated yet
    Prepared,

    /// Domain mutation in progress (persist-before-call)
    Executing,

    /// Mutation applied, bookkeeping in progress
    Committing,

    /// Terminal: Transfer completed successfully
    Committed,

    /// Compensation in progress (restoring snapshot)
    RollingBack,

    /// Terminal: Snapshot restored
    RolledBack,

    /// Terminal: Both the forward operation and its compensation failed
    Failed,
}

impl TransferState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Committed | TransferState::RolledBack | TransferState::Failed
        )
    }

    /// Check if a transfer in this state holds the single-flight guard
    #[inline]
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, TransferState::Idle) && !self.is_terminal()
    }

    /// Legal transitions of the state machine.
    ///
    /// `Committing -> RollingBack` is only taken by recovery; `RollingBack -> RollingBack`
    /// is a retried compensation after a crash.
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, Prepared)
                | (Prepared, Executing)
                | (Executing, Committing)
                | (Executing, RollingBack)
                | (Committing, Committed)
                | (Committing, RollingBack)
                | (Committing, Failed)
                | (RollingBack, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, Failed)
        )
    }

    /// Get the persisted state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Idle => "idle",
            TransferState::Preparing => "preparing",
            TransferState::Prepared => "prepared",
            TransferState::Executing => "executing",
            TransferState::Committing => "committing",
            TransferState::Committed => "committed",
            TransferState::RollingBack => "rolling-back",
            TransferState::RolledBack => "rolled-back",
            TransferState::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(TransferState::Idle),
            "preparing" => Ok(TransferState::Preparing),
            "prepared" => Ok(TransferState::Prepared),
            "executing" => Ok(TransferState::Executing),
            "committing" => Ok(TransferState::Committing),
            "committed" => Ok(TransferState::Committed),
            "rolling-back" => Ok(TransferState::RollingBack),
            "rolled-back" => Ok(TransferState::RolledBack),
            "failed" => Ok(TransferState::Failed),
            _ => Err(()),
        }
    }
}

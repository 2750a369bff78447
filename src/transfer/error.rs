//! Transfer Error Types
//!
//! Errors are grouped the way the coordinator treats them: validation and
//! concurrency errors are returned before anything is mutated, execution
//! errors trigger rollback, and rollback errors are terminal.

use thiserror::Error;

use super::state::TransferState;
use super::types::TransferDirection;

/// Transfer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document {document_id} is already in the target domain ({direction})")]
    AlreadyInDomain {
        document_id: String,
        direction: TransferDirection,
    },

    #[error("Invalid document snapshot: {0}")]
    InvalidSnapshot(String),

    // === Concurrency Errors ===
    #[error("Another transfer is already in progress")]
    TransferInProgress,

    /// The log holds an unresolved transfer; run recovery first
    #[error("Transfer of {document_id} is pending recovery")]
    PendingRecovery { document_id: String },

    // === Execution Errors ===
    #[error("Document disappeared during transfer: {0}")]
    DocumentDisappeared(String),

    #[error("No current user identity available")]
    NoIdentity,

    #[error("Remote operation timed out after {0}ms")]
    HostTimeout(u64),

    #[error("Remote operation failed: {0}")]
    HostFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transfer interrupted in state {0}")]
    Interrupted(TransferState),

    // === Terminal Errors ===
    #[error("Transfer failed ({original}) and rollback also failed ({rollback})")]
    RollbackFailed { original: String, rollback: String },

    #[error("Commit failed after mutation was applied: {0}")]
    CommitFailed(String),

    // === System Errors ===
    #[error("Transfer log error: {0}")]
    Log(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: TransferState,
        to: TransferState,
    },
}

impl TransferError {
    /// Stable error code for logs and machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            TransferError::AlreadyInDomain { .. } => "ALREADY_IN_DOMAIN",
            TransferError::InvalidSnapshot(_) => "INVALID_SNAPSHOT",
            TransferError::TransferInProgress => "TRANSFER_IN_PROGRESS",
            TransferError::PendingRecovery { .. } => "PENDING_RECOVERY",
            TransferError::DocumentDisappeared(_) => "DOCUMENT_DISAPPEARED",
            TransferError::NoIdentity => "NO_IDENTITY",
            TransferError::HostTimeout(_) => "HOST_TIMEOUT",
            TransferError::HostFailure(_) => "HOST_FAILURE",
            TransferError::Storage(_) => "STORAGE_ERROR",
            TransferError::Interrupted(_) => "INTERRUPTED",
            TransferError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            TransferError::CommitFailed(_) => "COMMIT_FAILED",
            TransferError::Log(_) => "LOG_ERROR",
            TransferError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
        }
    }

    /// Validation errors are raised by prepare before any state is written
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TransferError::DocumentNotFound(_)
                | TransferError::AlreadyInDomain { .. }
                | TransferError::InvalidSnapshot(_)
        )
    }

    /// Outcomes that need operator attention
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::RollbackFailed { .. } | TransferError::CommitFailed(_)
        )
    }
}

impl From<anyhow::Error> for TransferError {
    fn from(e: anyhow::Error) -> Self {
        TransferError::Storage(format!("{e:#}"))
    }
}

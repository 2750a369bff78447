//! Startup Recovery
//!
//! Resolves a transfer left in the durable log by a crash. The log is the
//! only input: recovery never needs anything that was not persisted before
//! the crash.
//!
//! | Persisted state                       | Action                          |
//! |---------------------------------------|---------------------------------|
//! | `preparing`, `prepared`               | discard, report untouched doc   |
//! | `executing`, `committing`             | roll back from the snapshot     |
//! | `rolling-back`                        | retry rollback (idempotent)     |
//! | `committed`, `rolled-back`, `failed`  | discard, nothing to recover     |
//! | corrupt / unknown                     | discard, nothing to recover     |

use tracing::{debug, info, warn};

use super::coordinator::TransferCoordinator;
use super::error::TransferError;
use super::log::LogEntry;
use super::state::TransferState;
use super::types::TransferOutcome;

impl TransferCoordinator {
    /// Resolve any transfer left incomplete by a previous run
    ///
    /// Returns `Ok(None)` when there was nothing to recover. Errors only when
    /// the log itself cannot be read or cleared, or a transfer is running.
    pub async fn recover_pending_transfer(
        &self,
    ) -> Result<Option<TransferOutcome>, TransferError> {
        let Some(_flight) = self.try_begin() else {
            return Err(TransferError::TransferInProgress);
        };

        let mut record = match self.log().read()? {
            None => {
                debug!("No pending transfer to recover");
                return Ok(None);
            }
            Some(LogEntry::Corrupt(raw)) => {
                warn!(bytes = raw.len(), "Discarding corrupt transfer log entry");
                self.log().clear()?;
                return Ok(None);
            }
            Some(LogEntry::Pending(record)) => record,
        };

        if let Err(e) = record.original_document.validate() {
            warn!(
                transfer_id = %record.id,
                error = %e,
                "Discarding transfer log entry with invalid snapshot"
            );
            self.log().clear()?;
            return Ok(None);
        }

        info!(
            transfer_id = %record.id,
            document_id = %record.document_id,
            direction = %record.direction,
            state = %record.state,
            "Recovering pending transfer"
        );

        match record.state {
            TransferState::Preparing | TransferState::Prepared => {
                // Execution never began
                self.log().clear()?;
                Ok(Some(TransferOutcome::Discarded {
                    document: record.original_document,
                }))
            }
            TransferState::Executing | TransferState::Committing | TransferState::RollingBack => {
                self.set_current(&record);
                let cause = TransferError::Interrupted(record.state);
                let options = self.default_options();
                Ok(Some(self.rollback(&mut record, cause, &options).await))
            }
            TransferState::Committed | TransferState::RolledBack | TransferState::Failed => {
                debug!(transfer_id = %record.id, "Pending transfer already terminal");
                self.log().clear()?;
                Ok(None)
            }
            TransferState::Idle => {
                // Never persisted by the coordinator
                warn!(transfer_id = %record.id, "Discarding idle transfer log entry");
                self.log().clear()?;
                Ok(None)
            }
        }
    }
}

//! Transfer Coordinator
//!
//! Orchestrates prepare -> execute -> commit, with rollback as the failure path.
//! This is the central component that drives state transitions and the only
//! writer of the durable transfer log.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use super::adapters::Collaborators;
use super::document::Document;
use super::error::TransferError;
use super::log::{LogEntry, TransferLog};
use super::state::TransferState;
use super::types::{TransferDirection, TransferOptions, TransferOutcome, TransferRecord};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Race a remote call against `timeout`. On timeout the call is dropped, not aborted remotely.
async fn race_host<F>(timeout: Duration, call: F) -> Result<(), TransferError>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransferError::HostFailure(format!("{e:#}"))),
        Err(_) => Err(TransferError::HostTimeout(
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

/// Held for the lifetime of one transfer
///
/// Dropping it (including when the caller drops the transfer future) clears
/// both the single-flight flag and the current record. An unresolved record
/// stays in the durable log and blocks new transfers until recovery runs.
pub(super) struct FlightGuard<'a> {
    flag: &'a AtomicBool,
    current: &'a Mutex<Option<TransferRecord>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Transfer Coordinator - one instance per storage
///
/// Call [`TransferCoordinator::recover_pending_transfer`] once at startup,
/// before accepting new transfers.
pub struct TransferCoordinator {
    collaborators: Collaborators,
    log: TransferLog,
    defaults: TransferOptions,
    in_flight: AtomicBool,
    current: Mutex<Option<TransferRecord>>,
}

impl TransferCoordinator {
    /// Create a new TransferCoordinator
    pub fn new(collaborators: Collaborators, log: TransferLog) -> Self {
        Self::with_defaults(collaborators, log, TransferOptions::default())
    }

    /// Create coordinator with default options (used by recovery)
    pub fn with_defaults(
        collaborators: Collaborators,
        log: TransferLog,
        defaults: TransferOptions,
    ) -> Self {
        Self {
            collaborators,
            log,
            defaults,
            in_flight: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    pub fn default_options(&self) -> TransferOptions {
        self.defaults.clone()
    }

    pub async fn transfer_to_team(
        &self,
        document_id: &str,
        options: TransferOptions,
    ) -> TransferOutcome {
        self.execute_transfer(document_id, TransferDirection::ToTeam, options)
            .await
    }

    pub async fn transfer_to_personal(
        &self,
        document_id: &str,
        options: TransferOptions,
    ) -> TransferOutcome {
        self.execute_transfer(document_id, TransferDirection::ToPersonal, options)
            .await
    }

    /// Run one transfer to a terminal outcome
    ///
    /// Never panics or returns early with an error: validation and concurrency
    /// failures come back as [`TransferOutcome::Rejected`], execution failures
    /// as a rollback result.
    pub async fn execute_transfer(
        &self,
        document_id: &str,
        direction: TransferDirection,
        options: TransferOptions,
    ) -> TransferOutcome {
        let Some(_flight) = self.try_begin() else {
            warn!(
                document_id = document_id,
                direction = %direction,
                "Transfer rejected: another transfer is in progress"
            );
            return TransferOutcome::Rejected {
                error: TransferError::TransferInProgress,
            };
        };

        let mut record = match self.prepare(document_id, direction, &options) {
            Ok(record) => record,
            Err(error) => {
                debug!(document_id = document_id, error = %error, "Transfer rejected in prepare");
                return TransferOutcome::Rejected { error };
            }
        };

        match self.execute(&mut record, &options).await {
            Ok(()) => self.commit(&mut record, &options),
            Err(error) => self.rollback(&mut record, error, &options).await,
        }
    }

    /// Snapshot of the in-flight record, if any
    pub fn current_transfer(&self) -> Option<TransferRecord> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_transfer_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(super) fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard {
                flag: &self.in_flight,
                current: &self.current,
            })
    }

    pub(super) fn log(&self) -> &TransferLog {
        &self.log
    }

    pub(super) fn set_current(&self, record: &TransferRecord) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
    }

    fn clear_current(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn should_sync(&self, options: &TransferOptions) -> bool {
        !options.skip_server_sync && self.collaborators.host.is_authenticated()
    }

    /// Move `record` to `next`, publish it and persist it.
    ///
    /// The in-memory state advances and progress is emitted even when the log
    /// write fails; the write error is returned so the caller never starts the
    /// mutation the new state describes.
    fn advance(
        &self,
        record: &mut TransferRecord,
        next: TransferState,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        if !record.state.can_transition_to(next) {
            return Err(TransferError::InvalidStateTransition {
                from: record.state,
                to: next,
            });
        }

        record.state = next;
        if next.is_terminal() {
            record.completed_at = Some(now_ms());
        }
        self.set_current(record);
        let persisted = self.log.write(record);
        options.emit(next);

        debug!(
            transfer_id = %record.id,
            document_id = %record.document_id,
            state = %next,
            "Transfer state advanced"
        );
        persisted
    }

    /// Enter a terminal state, then clear the log and the current pointer
    fn finish(&self, record: &mut TransferRecord, terminal: TransferState, options: &TransferOptions) {
        if let Err(e) = self.advance(record, terminal, options) {
            warn!(
                transfer_id = %record.id,
                state = %terminal,
                error = %e,
                "Terminal state not persisted"
            );
        }
        if let Err(e) = self.log.clear() {
            error!(transfer_id = %record.id, error = %e, "Failed to clear transfer log");
        }
        self.clear_current();
    }

    // ========================================================================
    // Prepare
    // ========================================================================

    fn prepare(
        &self,
        document_id: &str,
        direction: TransferDirection,
        options: &TransferOptions,
    ) -> Result<TransferRecord, TransferError> {
        self.ensure_log_free()?;

        let document = self
            .collaborators
            .documents
            .load_document(document_id)
            .with_context(|| format!("load {document_id}"))?
            .ok_or_else(|| TransferError::DocumentNotFound(document_id.to_string()))?;

        if direction.is_destination(document.is_team_document()) {
            return Err(TransferError::AlreadyInDomain {
                document_id: document_id.to_string(),
                direction,
            });
        }

        let snapshot = document.snapshot()?;
        let mut record = TransferRecord::new(direction, snapshot);

        // Persist the snapshot BEFORE anything is mutated
        let logged = self
            .advance(&mut record, TransferState::Preparing, options)
            .and_then(|()| self.advance(&mut record, TransferState::Prepared, options));

        if let Err(e) = logged {
            if let Err(clear_err) = self.log.clear() {
                warn!(error = %clear_err, "Failed to clear partially written transfer log");
            }
            self.clear_current();
            return Err(e);
        }

        info!(
            transfer_id = %record.id,
            document_id = document_id,
            direction = %direction,
            "Transfer prepared"
        );
        Ok(record)
    }

    /// The log is a single slot: never overwrite a record that still needs recovery
    fn ensure_log_free(&self) -> Result<(), TransferError> {
        match self.log.read()? {
            Some(LogEntry::Pending(pending)) if pending.state.is_in_progress() => {
                warn!(
                    transfer_id = %pending.id,
                    document_id = %pending.document_id,
                    state = %pending.state,
                    "Transfer rejected: unresolved transfer in log, run recovery first"
                );
                Err(TransferError::PendingRecovery {
                    document_id: pending.document_id,
                })
            }
            Some(LogEntry::Corrupt(_)) => {
                warn!("Overwriting corrupt transfer log entry");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Execute
    // ========================================================================

    async fn execute(
        &self,
        record: &mut TransferRecord,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        self.advance(record, TransferState::Executing, options)?;

        match record.direction {
            TransferDirection::ToTeam => self.execute_to_team(record, options).await?,
            TransferDirection::ToPersonal => self.execute_to_personal(record, options).await?,
        }

        self.advance(record, TransferState::Committing, options)
    }

    /// Local save first, then remote sync. Remote failure fails the transfer.
    async fn execute_to_team(
        &self,
        record: &TransferRecord,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        let documents = &self.collaborators.documents;
        let document = documents
            .load_document(&record.document_id)
            .with_context(|| format!("reload {}", record.document_id))?
            .ok_or_else(|| TransferError::DocumentDisappeared(record.document_id.clone()))?;

        let user = self
            .collaborators
            .identity
            .current_user()
            .ok_or(TransferError::NoIdentity)?;

        let updated = document.into_team(&user, now_ms());
        documents
            .save_document(&updated)
            .with_context(|| format!("save {}", updated.id))?;

        if self.should_sync(options) {
            debug!(
                transfer_id = %record.id,
                host = self.collaborators.host.name(),
                "Saving document to host"
            );
            race_host(
                options.timeout,
                self.collaborators.host.save_to_host(&updated),
            )
            .await?;
        }
        Ok(())
    }

    /// Remote delete first (best-effort), then strip team fields locally.
    async fn execute_to_personal(
        &self,
        record: &TransferRecord,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        if self.should_sync(options)
            && let Err(e) = race_host(
                options.timeout,
                self.collaborators.host.delete_from_host(&record.document_id),
            )
            .await
        {
            warn!(
                transfer_id = %record.id,
                document_id = %record.document_id,
                error = %e,
                "Remote delete failed (best-effort, continuing)"
            );
        }

        let documents = &self.collaborators.documents;
        let document = documents
            .load_document(&record.document_id)
            .with_context(|| format!("reload {}", record.document_id))?
            .ok_or_else(|| TransferError::DocumentDisappeared(record.document_id.clone()))?;

        let updated = document.into_personal(now_ms());
        documents
            .save_document(&updated)
            .with_context(|| format!("save {}", updated.id))?;
        Ok(())
    }

    // ========================================================================
    // Commit
    // ========================================================================

    fn commit(&self, record: &mut TransferRecord, options: &TransferOptions) -> TransferOutcome {
        match self.publish_metadata(record) {
            Ok(document) => {
                self.finish(record, TransferState::Committed, options);
                info!(
                    transfer_id = %record.id,
                    document_id = %record.document_id,
                    direction = %record.direction,
                    "Transfer committed"
                );
                TransferOutcome::Committed { document }
            }
            Err(e) => {
                // Mutation is already applied; report, do not roll back
                let error = TransferError::CommitFailed(e.to_string());
                record.error = Some(error.to_string());
                self.finish(record, TransferState::Failed, options);
                error!(
                    transfer_id = %record.id,
                    document_id = %record.document_id,
                    error = %error,
                    "Transfer commit failed - storage inconsistency, operator attention required"
                );
                TransferOutcome::Failed { error }
            }
        }
    }

    fn publish_metadata(&self, record: &TransferRecord) -> Result<Document, TransferError> {
        let document = self
            .collaborators
            .documents
            .load_document(&record.document_id)
            .with_context(|| format!("reload {}", record.document_id))?
            .ok_or_else(|| TransferError::DocumentDisappeared(record.document_id.clone()))?;

        self.collaborators
            .metadata
            .update_metadata(&document.id, &document.metadata())
            .with_context(|| format!("update metadata for {}", document.id))?;
        Ok(document)
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    /// Restore the snapshot. Shared by the live path and recovery.
    pub(super) async fn rollback(
        &self,
        record: &mut TransferRecord,
        cause: TransferError,
        options: &TransferOptions,
    ) -> TransferOutcome {
        warn!(
            transfer_id = %record.id,
            document_id = %record.document_id,
            state = %record.state,
            error = %cause,
            "Transfer failed, rolling back"
        );

        if let Err(e) = self.advance(record, TransferState::RollingBack, options) {
            warn!(transfer_id = %record.id, error = %e, "Rolling-back state not persisted");
        }

        let original = record.original_document.clone();
        if let Err(e) = self.collaborators.documents.save_document(&original) {
            let error = TransferError::RollbackFailed {
                original: cause.to_string(),
                rollback: format!("{e:#}"),
            };
            record.error = Some(error.to_string());
            self.finish(record, TransferState::Failed, options);
            error!(
                transfer_id = %record.id,
                document_id = %record.document_id,
                error = %error,
                "ROLLBACK FAILED - operator attention required"
            );
            return TransferOutcome::Failed { error };
        }

        if let Err(e) = self
            .collaborators
            .metadata
            .update_metadata(&original.id, &original.metadata())
        {
            warn!(transfer_id = %record.id, error = %e, "Restored metadata not pushed");
        }

        // Undo a possible partial remote write; opportunistic only.
        // Bounded by its own timeout, so a hung host costs up to twice `options.timeout`.
        if record.direction == TransferDirection::ToTeam
            && self.should_sync(options)
            && let Err(e) = race_host(
                options.timeout,
                self.collaborators.host.delete_from_host(&record.document_id),
            )
            .await
        {
            warn!(
                transfer_id = %record.id,
                error = %e,
                "Remote cleanup after rollback failed (ignored)"
            );
        }

        record.error = Some(cause.to_string());
        self.finish(record, TransferState::RolledBack, options);
        info!(
            transfer_id = %record.id,
            document_id = %record.document_id,
            "Transfer rolled back"
        );
        TransferOutcome::RolledBack {
            document: original,
            error: cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::adapters::StaticIdentity;
    use crate::transfer::adapters::mock::{MemoryDocumentStore, MockHost, RecordingMetadataIndex};
    use crate::transfer::document::UserIdentity;
    use crate::transfer::log::{LogEntry, MemoryKvStore};
    use std::sync::Arc;

    fn coordinator(store: Arc<MemoryDocumentStore>) -> (TransferCoordinator, TransferLog) {
        let log = TransferLog::new(Arc::new(MemoryKvStore::new()));
        let collaborators = Collaborators {
            documents: store,
            identity: Arc::new(StaticIdentity::new(Some(UserIdentity::new("user-1", "Alice")))),
            host: Arc::new(MockHost::new(false)),
            metadata: Arc::new(RecordingMetadataIndex::new()),
        };
        (TransferCoordinator::new(collaborators, log.clone()), log)
    }

    #[tokio::test]
    async fn test_race_host_maps_results() {
        let ok = race_host(Duration::from_millis(50), async { Ok::<(), anyhow::Error>(()) }).await;
        assert!(ok.is_ok());

        let failed = race_host(Duration::from_millis(50), async {
            Err::<(), _>(anyhow::anyhow!("boom"))
        })
        .await;
        assert_eq!(failed, Err(TransferError::HostFailure("boom".into())));

        let hung = race_host(Duration::from_millis(20), std::future::pending()).await;
        assert_eq!(hung, Err(TransferError::HostTimeout(20)));
    }

    #[test]
    fn test_flight_guard_releases_on_drop() {
        let (coordinator, _) = coordinator(Arc::new(MemoryDocumentStore::new()));
        {
            let guard = coordinator.try_begin();
            assert!(guard.is_some());
            assert!(coordinator.is_transfer_in_progress());
            assert!(coordinator.try_begin().is_none());
            coordinator.set_current(&TransferRecord::new(
                TransferDirection::ToTeam,
                Document::personal("doc-1", "Plan"),
            ));
        }
        assert!(!coordinator.is_transfer_in_progress());
        assert!(coordinator.current_transfer().is_none());
    }

    #[test]
    fn test_prepare_validation_writes_nothing() {
        let store = Arc::new(MemoryDocumentStore::new());
        let (coordinator, log) = coordinator(store.clone());

        let err = coordinator
            .prepare("missing", TransferDirection::ToTeam, &TransferOptions::default())
            .unwrap_err();
        assert_eq!(err, TransferError::DocumentNotFound("missing".into()));

        store.insert(Document::personal("doc-1", "Plan"));
        let err = coordinator
            .prepare("doc-1", TransferDirection::ToPersonal, &TransferOptions::default())
            .unwrap_err();
        assert!(matches!(err, TransferError::AlreadyInDomain { .. }));

        assert_eq!(log.read().unwrap(), None);
        assert!(coordinator.current_transfer().is_none());
    }

    #[test]
    fn test_prepare_logs_snapshot() {
        let store = Arc::new(MemoryDocumentStore::with_document(Document::personal(
            "doc-1", "Plan",
        )));
        let (coordinator, log) = coordinator(store);

        let record = coordinator
            .prepare("doc-1", TransferDirection::ToTeam, &TransferOptions::default())
            .unwrap();
        assert_eq!(record.state, TransferState::Prepared);

        match log.read().unwrap() {
            Some(LogEntry::Pending(logged)) => assert_eq!(logged, record),
            other => panic!("unexpected log entry: {other:?}"),
        }
        assert_eq!(coordinator.current_transfer(), Some(record));
    }

    #[test]
    fn test_advance_rejects_illegal_transition() {
        let (coordinator, log) = coordinator(Arc::new(MemoryDocumentStore::new()));
        let mut record =
            TransferRecord::new(TransferDirection::ToTeam, Document::personal("doc-1", "Plan"));

        let err = coordinator
            .advance(&mut record, TransferState::Committed, &TransferOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::InvalidStateTransition {
                from: TransferState::Idle,
                to: TransferState::Committed,
            }
        );
        assert_eq!(record.state, TransferState::Idle);
        assert_eq!(log.read().unwrap(), None);
    }
}

//! Document Transfer FSM
//!
//! Moves a document between the personal (local) domain and the team
//! (remote-backed) domain without losing, duplicating or half-converting it,
//! even across crashes, network failures and concurrent attempts.
//!
//! # State Machine
//!
//! ```text
//! IDLE → PREPARING → PREPARED → EXECUTING → COMMITTING → COMMITTED
//!                                   ↓            ↓
//!                              ROLLING_BACK → ROLLED_BACK      (COMMITTING → FAILED
//!                                   ↓                           on commit inconsistency)
//!                                FAILED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Persist-Before-Call**: The transfer log is rewritten before the mutation each state describes
//! 2. **Snapshot Is Truth**: Rollback restores `original_document` verbatim, never re-derived
//! 3. **Single Flight**: One transfer per coordinator; a second call is rejected with no side effects
//! 4. **Local First**: To-team saves locally before syncing; to-personal deletes remotely before stripping
//! 5. **Single Slot**: A new transfer is refused while the log holds an unresolved record
//!
//! # Timeouts
//!
//! Every host call is raced against `TransferOptions::timeout`. A to-team
//! rollback issues one more bounded call (remote cleanup), so a hung host can
//! hold a failing transfer for up to twice the timeout.
//!
//! Dropping a transfer future mid-flight releases the coordinator but leaves
//! the record in the log; call `recover_pending_transfer` to resolve it.
//!
//! Cross-process coordination is not provided: two coordinators over the
//! same storage can race.

pub mod adapters;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod log;
pub mod recovery;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use adapters::{Collaborators, DocumentStore, HostSync, IdentityProvider, MetadataIndex};
pub use coordinator::TransferCoordinator;
pub use document::{Document, DocumentDomain, DocumentMetadata, TeamFields, UserIdentity};
pub use error::TransferError;
pub use log::{FileKvStore, KeyValueStore, LogEntry, MemoryKvStore, TransferLog};
pub use state::TransferState;
pub use types::{TransferDirection, TransferId, TransferOptions, TransferOutcome, TransferRecord};

//! doc_transfer - Atomic cross-domain document transfer
//!
//! Moves documents between a personal and a team domain with a durable
//! transfer log, compensating rollback and startup crash recovery.
//!
//! # Modules
//!
//! - [`transfer`] - Transfer FSM, coordinator, recovery and collaborator traits
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use transfer::{
    Collaborators, Document, TransferCoordinator, TransferDirection, TransferError,
    TransferOptions, TransferOutcome, TransferState,
};

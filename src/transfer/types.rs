//! Transfer Core Types
//!
//! Type definitions for the document transfer FSM.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::document::Document;
use super::error::TransferError;
use super::state::TransferState;

/// Default bound on remote calls
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Transfer attempt ID - ULID-based unique identifier (not the document id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    /// Generate a new unique TransferId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Destination domain of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferDirection {
    /// Personal -> Team
    ToTeam,
    /// Team -> Personal
    ToPersonal,
}

impl TransferDirection {
    /// Whether a document with the given domain flag is already at the destination
    #[inline]
    pub fn is_destination(&self, is_team_document: bool) -> bool {
        match self {
            TransferDirection::ToTeam => is_team_document,
            TransferDirection::ToPersonal => !is_team_document,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::ToTeam => "to-team",
            TransferDirection::ToPersonal => "to-personal",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transfer record persisted in the durable transfer log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Unique transfer attempt ID
    pub id: TransferId,
    pub document_id: String,
    pub direction: TransferDirection,
    /// Current FSM state
    pub state: TransferState,
    /// Pre-mutation snapshot, the sole source of truth for rollback
    pub original_document: Document,
    /// Started timestamp (millis)
    pub started_at: i64,
    /// Completed timestamp (millis), set on terminal states
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Failure description, set only on terminal failure paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferRecord {
    /// Create a new in-memory record in IDLE state; the first transition persists it
    pub fn new(direction: TransferDirection, original_document: Document) -> Self {
        Self {
            id: TransferId::new(),
            document_id: original_document.id.clone(),
            direction,
            state: TransferState::Idle,
            original_document,
            started_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
            error: None,
        }
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] {} {} state={}",
            self.id, self.document_id, self.direction, self.state
        )
    }
}

/// Observer invoked synchronously once per state transition
pub type ProgressCallback = Arc<dyn Fn(TransferState) + Send + Sync>;

/// Per-call transfer options
#[derive(Clone)]
pub struct TransferOptions {
    pub on_progress: Option<ProgressCallback>,
    /// Bound on each remote call
    pub timeout: Duration,
    /// Bypass remote calls entirely
    pub skip_server_sync: bool,
}

impl TransferOptions {
    pub fn with_progress(mut self, f: impl Fn(TransferState) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn with_skip_server_sync(mut self, skip: bool) -> Self {
        self.skip_server_sync = skip;
        self
    }

    pub(crate) fn emit(&self, state: TransferState) {
        if let Some(cb) = &self.on_progress {
            cb(state);
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            on_progress: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            skip_server_sync: false,
        }
    }
}

impl fmt::Debug for TransferOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOptions")
            .field("on_progress", &self.on_progress.is_some())
            .field("timeout", &self.timeout)
            .field("skip_server_sync", &self.skip_server_sync)
            .finish()
    }
}

/// Definitive result of a transfer or recovery
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Mutation applied and committed
    Committed { document: Document },
    /// Recovered record that never started executing; document untouched
    Discarded { document: Document },
    /// Execution failed and the snapshot was restored
    RolledBack {
        document: Document,
        error: TransferError,
    },
    /// Unrecovered: needs operator attention
    Failed { error: TransferError },
    /// Refused before anything was written (validation, concurrency)
    Rejected { error: TransferError },
}

impl TransferOutcome {
    #[inline]
    pub fn success(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Committed { .. } | TransferOutcome::Discarded { .. }
        )
    }

    #[inline]
    pub fn rolled_back(&self) -> bool {
        matches!(self, TransferOutcome::RolledBack { .. })
    }

    pub fn document(&self) -> Option<&Document> {
        match self {
            TransferOutcome::Committed { document }
            | TransferOutcome::Discarded { document }
            | TransferOutcome::RolledBack { document, .. } => Some(document),
            TransferOutcome::Failed { .. } | TransferOutcome::Rejected { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TransferError> {
        match self {
            TransferOutcome::RolledBack { error, .. }
            | TransferOutcome::Failed { error }
            | TransferOutcome::Rejected { error } => Some(error),
            TransferOutcome::Committed { .. } | TransferOutcome::Discarded { .. } => None,
        }
    }

    /// `{success, document?, error?, rolledBack}` view for callers outside Rust
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "success": self.success(),
            "rolledBack": self.rolled_back(),
        });
        if let Some(doc) = self.document()
            && let Ok(doc) = serde_json::to_value(doc)
        {
            value["document"] = doc;
        }
        if let Some(err) = self.error() {
            value["error"] = err.to_string().into();
            value["code"] = err.code().into();
        }
        value
    }
}

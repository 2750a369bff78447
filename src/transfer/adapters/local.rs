//! Local adapters
//!
//! JSON-file document store and metadata index, a fixed identity, and a
//! host that is never authenticated. Used by the `doc_transfer` binary for
//! local-only operation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, bail};
use async_trait::async_trait;
use tracing::debug;

use super::{DocumentStore, HostSync, IdentityProvider, MetadataIndex};
use crate::transfer::document::{Document, DocumentMetadata, UserIdentity};
use crate::transfer::log::{FileKvStore, KeyValueStore};

const METADATA_INDEX_KEY: &str = "metadata_index";

/// Document ids become file names, so keep them to a safe alphabet
fn check_document_id(id: &str) -> anyhow::Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        bail!("invalid document id {id:?}");
    }
    Ok(())
}

/// One `<id>.json` file per document
pub struct JsonDocumentStore {
    kv: FileKvStore,
}

impl JsonDocumentStore {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self {
            kv: FileKvStore::open(dir.as_ref())?,
        })
    }
}

impl DocumentStore for JsonDocumentStore {
    fn load_document(&self, id: &str) -> anyhow::Result<Option<Document>> {
        check_document_id(id)?;
        match self.kv.get(id)? {
            Some(raw) => {
                let doc = serde_json::from_str(&raw)
                    .with_context(|| format!("parse document {id}"))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    fn save_document(&self, doc: &Document) -> anyhow::Result<()> {
        check_document_id(&doc.id)?;
        let raw = serde_json::to_string_pretty(doc)
            .with_context(|| format!("serialize document {}", doc.id))?;
        self.kv.set(&doc.id, &raw)
    }
}

/// Metadata for every document kept in a single JSON map
pub struct JsonMetadataIndex {
    kv: FileKvStore,
    write_lock: Mutex<()>,
}

impl JsonMetadataIndex {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self {
            kv: FileKvStore::open(dir.as_ref())?,
            write_lock: Mutex::new(()),
        })
    }

    pub fn load(&self) -> anyhow::Result<BTreeMap<String, DocumentMetadata>> {
        match self.kv.get(METADATA_INDEX_KEY)? {
            Some(raw) => serde_json::from_str(&raw).context("parse metadata index"),
            None => Ok(BTreeMap::new()),
        }
    }
}

impl MetadataIndex for JsonMetadataIndex {
    fn update_metadata(&self, id: &str, metadata: &DocumentMetadata) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.load()?;
        index.insert(id.to_string(), metadata.clone());
        let raw = serde_json::to_string_pretty(&index).context("serialize metadata index")?;
        self.kv.set(METADATA_INDEX_KEY, &raw)?;
        debug!(document_id = id, team = metadata.is_team_document, "Metadata updated");
        Ok(())
    }
}

/// Identity fixed at startup (from config)
pub struct StaticIdentity {
    user: Option<UserIdentity>,
}

impl StaticIdentity {
    pub fn new(user: Option<UserIdentity>) -> Self {
        Self { user }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserIdentity> {
        self.user.clone()
    }
}

/// Disconnected host: never authenticated, so the coordinator never calls it
#[derive(Debug, Default)]
pub struct OfflineHost;

#[async_trait]
impl HostSync for OfflineHost {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn is_authenticated(&self) -> bool {
        false
    }

    async fn save_to_host(&self, doc: &Document) -> anyhow::Result<()> {
        bail!("offline: cannot save {} to host", doc.id)
    }

    async fn delete_from_host(&self, id: &str) -> anyhow::Result<()> {
        bail!("offline: cannot delete {id} from host")
    }
}

//! Collaborator Adapters
//!
//! The coordinator never talks to storage, identity or the remote host
//! directly. Everything goes through these traits so that tests and
//! embedders can swap implementations.
//!
//! Local storage calls are synchronous and not subject to the transfer
//! timeout; only [`HostSync`] calls suspend.

pub mod local;
#[cfg(test)]
pub mod mock;

pub use local::{JsonDocumentStore, JsonMetadataIndex, OfflineHost, StaticIdentity};

use std::sync::Arc;

use async_trait::async_trait;

use super::document::{Document, DocumentMetadata, UserIdentity};

/// Local document persistence
pub trait DocumentStore: Send + Sync {
    fn load_document(&self, id: &str) -> anyhow::Result<Option<Document>>;
    fn save_document(&self, doc: &Document) -> anyhow::Result<()>;
}

/// Identity resolution
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;
}

/// Remote (team) synchronization
#[async_trait]
pub trait HostSync: Send + Sync {
    /// Get adapter name for logging
    fn name(&self) -> &'static str;

    fn is_authenticated(&self) -> bool;

    async fn save_to_host(&self, doc: &Document) -> anyhow::Result<()>;

    async fn delete_from_host(&self, id: &str) -> anyhow::Result<()>;
}

/// Metadata index used by list views
pub trait MetadataIndex: Send + Sync {
    fn update_metadata(&self, id: &str, metadata: &DocumentMetadata) -> anyhow::Result<()>;
}

/// The injected capabilities a coordinator needs
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub host: Arc<dyn HostSync>,
    pub metadata: Arc<dyn MetadataIndex>,
}

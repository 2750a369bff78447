//! Mock collaborators for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;

use super::{DocumentStore, HostSync, MetadataIndex};
use crate::transfer::document::{Document, DocumentMetadata};
use crate::transfer::log::{KeyValueStore, LogEntry, MemoryKvStore, TransferLog};
use crate::transfer::state::TransferState;

/// State held by the log right now, if it holds a readable record
fn logged_state(log: &TransferLog) -> Option<TransferState> {
    match log.read() {
        Ok(Some(LogEntry::Pending(record))) => Some(record.state),
        _ => None,
    }
}

/// In-memory document store with injectable faults
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, Document>>,
    load_count: AtomicUsize,
    save_count: AtomicUsize,
    /// Loads with index >= n report the document as absent
    hide_after_loads: Mutex<Option<usize>>,
    /// Saves with index >= n fail
    fail_saves_from: Mutex<Option<usize>>,
    watched_log: Mutex<Option<TransferLog>>,
    states_at_save: Mutex<Vec<Option<TransferState>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: Document) -> Self {
        let store = Self::new();
        store.insert(doc);
        store
    }

    pub fn insert(&self, doc: Document) {
        self.docs.lock().unwrap().insert(doc.id.clone(), doc);
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs.lock().unwrap().get(id).cloned()
    }

    pub fn hide_after_loads(&self, n: usize) {
        *self.hide_after_loads.lock().unwrap() = Some(n);
    }

    pub fn fail_saves_from(&self, n: usize) {
        *self.fail_saves_from.lock().unwrap() = Some(n);
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Record the logged state at every save
    pub fn watch_log(&self, log: TransferLog) {
        *self.watched_log.lock().unwrap() = Some(log);
    }

    pub fn states_at_save(&self) -> Vec<Option<TransferState>> {
        self.states_at_save.lock().unwrap().clone()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load_document(&self, id: &str) -> anyhow::Result<Option<Document>> {
        let n = self.load_count.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.hide_after_loads.lock().unwrap()
            && n >= limit
        {
            return Ok(None);
        }
        Ok(self.get(id))
    }

    fn save_document(&self, doc: &Document) -> anyhow::Result<()> {
        if let Some(log) = self.watched_log.lock().unwrap().as_ref() {
            self.states_at_save.lock().unwrap().push(logged_state(log));
        }
        let n = self.save_count.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_saves_from.lock().unwrap()
            && n >= limit
        {
            bail!("Mock save failure for {}", doc.id);
        }
        self.insert(doc.clone());
        Ok(())
    }
}

/// How a mocked remote call behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostBehavior {
    Succeed,
    Fail,
    /// Succeeds after the given number of milliseconds
    Delay(u64),
    /// Never resolves
    Hang,
}

pub struct MockHost {
    authenticated: AtomicBool,
    save_behavior: Mutex<HostBehavior>,
    delete_behavior: Mutex<HostBehavior>,
    save_count: AtomicUsize,
    delete_count: AtomicUsize,
    watched_log: Mutex<Option<TransferLog>>,
    states_at_call: Mutex<Vec<(&'static str, Option<TransferState>)>>,
}

impl MockHost {
    pub fn new(authenticated: bool) -> Self {
        Self {
            authenticated: AtomicBool::new(authenticated),
            save_behavior: Mutex::new(HostBehavior::Succeed),
            delete_behavior: Mutex::new(HostBehavior::Succeed),
            save_count: AtomicUsize::new(0),
            delete_count: AtomicUsize::new(0),
            watched_log: Mutex::new(None),
            states_at_call: Mutex::new(Vec::new()),
        }
    }

    pub fn set_save(&self, behavior: HostBehavior) {
        *self.save_behavior.lock().unwrap() = behavior;
    }

    pub fn set_delete(&self, behavior: HostBehavior) {
        *self.delete_behavior.lock().unwrap() = behavior;
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    /// Record the logged state at every remote call
    pub fn watch_log(&self, log: TransferLog) {
        *self.watched_log.lock().unwrap() = Some(log);
    }

    pub fn states_at_call(&self) -> Vec<(&'static str, Option<TransferState>)> {
        self.states_at_call.lock().unwrap().clone()
    }

    fn observe(&self, call: &'static str) {
        if let Some(log) = self.watched_log.lock().unwrap().as_ref() {
            self.states_at_call
                .lock()
                .unwrap()
                .push((call, logged_state(log)));
        }
    }

    async fn run(behavior: HostBehavior, what: &str) -> anyhow::Result<()> {
        match behavior {
            HostBehavior::Succeed => Ok(()),
            HostBehavior::Fail => bail!("Mock {what} failure"),
            HostBehavior::Delay(ms) => {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                Ok(())
            }
            HostBehavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl HostSync for MockHost {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn save_to_host(&self, _doc: &Document) -> anyhow::Result<()> {
        self.observe("save");
        self.save_count.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.save_behavior.lock().unwrap();
        Self::run(behavior, "save").await
    }

    async fn delete_from_host(&self, _id: &str) -> anyhow::Result<()> {
        self.observe("delete");
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.delete_behavior.lock().unwrap();
        Self::run(behavior, "delete").await
    }
}

/// Records every metadata push
#[derive(Default)]
pub struct RecordingMetadataIndex {
    updates: Mutex<Vec<(String, DocumentMetadata)>>,
}

impl RecordingMetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(String, DocumentMetadata)> {
        self.updates.lock().unwrap().clone()
    }
}

impl MetadataIndex for RecordingMetadataIndex {
    fn update_metadata(&self, id: &str, metadata: &DocumentMetadata) -> anyhow::Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), metadata.clone()));
        Ok(())
    }
}

/// Transfer log storage whose writes fail from the nth `set` on
#[derive(Default)]
pub struct FailingKvStore {
    inner: MemoryKvStore,
    set_count: AtomicUsize,
    /// Sets with index >= n fail
    fail_sets_from: Mutex<Option<usize>>,
}

impl FailingKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sets_from(&self, n: usize) {
        *self.fail_sets_from.lock().unwrap() = Some(n);
    }
}

impl KeyValueStore for FailingKvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let n = self.set_count.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_sets_from.lock().unwrap()
            && n >= limit
        {
            bail!("Mock disk full writing {key}");
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_faults() {
        let store = MemoryDocumentStore::with_document(Document::personal("doc-1", "Plan"));
        store.hide_after_loads(1);
        assert!(store.load_document("doc-1").unwrap().is_some());
        assert!(store.load_document("doc-1").unwrap().is_none());

        store.fail_saves_from(1);
        let doc = Document::personal("doc-2", "Other");
        assert!(store.save_document(&doc).is_ok());
        assert!(store.save_document(&doc).is_err());
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_host_behaviors() {
        let host = MockHost::new(true);
        assert!(host.save_to_host(&Document::personal("d", "t")).await.is_ok());

        host.set_delete(HostBehavior::Fail);
        assert!(host.delete_from_host("d").await.is_err());

        host.set_save(HostBehavior::Hang);
        let hung = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            host.save_to_host(&Document::personal("d", "t")),
        )
        .await;
        assert!(hung.is_err());
        assert_eq!(host.save_count(), 2);
        assert_eq!(host.delete_count(), 1);
    }

    #[test]
    fn test_failing_kv_store() {
        let kv = FailingKvStore::new();
        kv.fail_sets_from(1);
        assert!(kv.set("k", "a").is_ok());
        assert!(kv.set("k", "b").is_err());
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("a"));
        assert!(kv.remove("k").is_ok());
        assert_eq!(kv.get("k").unwrap(), None);
    }
}

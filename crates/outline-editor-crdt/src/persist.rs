//! Collaborator interfaces for storing documents, indexing backlinks and
//! taking backups, plus an in-memory store for tests and tools.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::config::BackupSchedule;
use crate::error::PersistenceError;

/// Where a document lives on its data store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentAddress(SmolStr);

impl DocumentAddress {
    /// Wrap a store-specific address string.
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(SmolStr::new(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for DocumentAddress {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

/// A store reported that a document changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub address: DocumentAddress,
    pub revision: SmolStr,
}

/// Reference names added and removed since the last persisted value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceDiff {
    pub added: BTreeSet<SmolStr>,
    pub deleted: BTreeSet<SmolStr>,
}

impl ReferenceDiff {
    /// Names in `current` but not `previous` are added; the reverse are deleted.
    pub fn between(previous: &BTreeSet<SmolStr>, current: &BTreeSet<SmolStr>) -> Self {
        Self {
            added: current.difference(previous).cloned().collect(),
            deleted: previous.difference(current).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// Number of backlink updates this diff needs.
    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len()
    }
}

/// Storage for serialized documents.
pub trait DocumentStore: Send + Sync + 'static {
    /// The stored serialization. An empty string is a new, blank document.
    fn load<'a>(
        &'a self,
        address: &'a DocumentAddress,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send + 'a;

    fn save<'a>(
        &'a self,
        address: &'a DocumentAddress,
        value: &'a str,
        references: &'a ReferenceDiff,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a;
}

/// Reverse index from a concept name to the documents mentioning it.
pub trait BacklinkIndex: Send + Sync + 'static {
    fn add_backlink<'a>(
        &'a self,
        target: &'a str,
        source: &'a DocumentAddress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a;

    fn remove_backlink<'a>(
        &'a self,
        target: &'a str,
        source: &'a DocumentAddress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a;
}

/// Destination for periodic copies of the open document.
pub trait BackupSink: Send + Sync + 'static {
    fn backup<'a>(
        &'a self,
        address: &'a DocumentAddress,
        value: &'a str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a;
}

/// Apply a reference diff to a backlink index, all calls concurrently.
///
/// There is no transaction across documents: every call is attempted, and
/// failures are counted into `PartialReferenceUpdate`.
pub async fn update_backlinks<B: BacklinkIndex>(
    index: &B,
    source: &DocumentAddress,
    diff: &ReferenceDiff,
) -> Result<(), PersistenceError> {
    if diff.is_empty() {
        return Ok(());
    }
    let adds = n0_future::join_all(
        diff.added
            .iter()
            .map(|target| index.add_backlink(target, source)),
    );
    let removes = n0_future::join_all(
        diff.deleted
            .iter()
            .map(|target| index.remove_backlink(target, source)),
    );
    let (adds, removes) = tokio::join!(adds, removes);

    let total = diff.len();
    let failed = adds
        .iter()
        .chain(removes.iter())
        .filter_map(|result| result.as_ref().err())
        .inspect(|e| warn!(%source, "backlink update failed: {e}"))
        .count();
    if failed > 0 {
        return Err(PersistenceError::PartialReferenceUpdate { failed, total });
    }
    debug!(%source, added = diff.added.len(), deleted = diff.deleted.len(), "backlinks updated");
    Ok(())
}

/// A document store that keeps a backlink index in step with each save.
///
/// The text is saved first; a failed text save skips the backlink fan-out.
#[derive(Debug, Clone)]
pub struct LinkedStore<S, B> {
    store: S,
    backlinks: B,
}

impl<S, B> LinkedStore<S, B> {
    /// Save documents to `store` and keep `backlinks` in step with their references.
    pub fn new(store: S, backlinks: B) -> Self {
        Self { store, backlinks }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backlinks(&self) -> &B {
        &self.backlinks
    }
}

impl<S: DocumentStore, B: BacklinkIndex> DocumentStore for LinkedStore<S, B> {
    fn load<'a>(
        &'a self,
        address: &'a DocumentAddress,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send + 'a {
        self.store.load(address)
    }

    fn save<'a>(
        &'a self,
        address: &'a DocumentAddress,
        value: &'a str,
        references: &'a ReferenceDiff,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        async move {
            self.store.save(address, value, references).await?;
            update_backlinks(&self.backlinks, address, references).await
        }
    }
}

impl<T: DocumentStore> DocumentStore for Arc<T> {
    fn load<'a>(
        &'a self,
        address: &'a DocumentAddress,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send + 'a {
        T::load(self, address)
    }

    fn save<'a>(
        &'a self,
        address: &'a DocumentAddress,
        value: &'a str,
        references: &'a ReferenceDiff,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        T::save(self, address, value, references)
    }
}

impl<T: BacklinkIndex> BacklinkIndex for Arc<T> {
    fn add_backlink<'a>(
        &'a self,
        target: &'a str,
        source: &'a DocumentAddress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        T::add_backlink(self, target, source)
    }

    fn remove_backlink<'a>(
        &'a self,
        target: &'a str,
        source: &'a DocumentAddress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        T::remove_backlink(self, target, source)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    documents: BTreeMap<DocumentAddress, String>,
    saves: Vec<(DocumentAddress, String)>,
    backlinks: BTreeMap<SmolStr, BTreeSet<DocumentAddress>>,
    failing_targets: BTreeSet<SmolStr>,
    fail_saves: bool,
}

/// In-memory document store, backlink index and backup sink.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MemoryInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut inner)
    }

    /// Put a document in place without recording a save.
    pub fn insert(&self, address: impl Into<DocumentAddress>, value: impl Into<String>) {
        let (address, value) = (address.into(), value.into());
        self.with(|inner| inner.documents.insert(address, value));
    }

    pub fn get(&self, address: &DocumentAddress) -> Option<String> {
        self.with(|inner| inner.documents.get(address).cloned())
    }

    /// Every save (and backup) received, in order.
    pub fn saves(&self) -> Vec<(DocumentAddress, String)> {
        self.with(|inner| inner.saves.clone())
    }

    /// Addresses currently linking to `target`.
    pub fn backlinks_to(&self, target: &str) -> BTreeSet<DocumentAddress> {
        self.with(|inner| inner.backlinks.get(target).cloned().unwrap_or_default())
    }

    /// Make backlink updates for `target` fail.
    pub fn fail_backlinks_for(&self, target: &str) {
        let target = SmolStr::new(target);
        self.with(|inner| inner.failing_targets.insert(target));
    }

    /// Make every document save fail until called again with false.
    pub fn fail_saves(&self, fail: bool) {
        self.with(|inner| inner.fail_saves = fail);
    }
}

impl DocumentStore for MemoryStore {
    fn load<'a>(
        &'a self,
        address: &'a DocumentAddress,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send + 'a {
        let result = self.get(address).ok_or_else(|| PersistenceError::NotFound {
            address: address.to_string(),
        });
        async move { result }
    }

    fn save<'a>(
        &'a self,
        address: &'a DocumentAddress,
        value: &'a str,
        _references: &'a ReferenceDiff,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        let result = self.with(|inner| {
            if inner.fail_saves {
                return Err(PersistenceError::backend("memory store is failing saves"));
            }
            inner.documents.insert(address.clone(), value.to_string());
            inner.saves.push((address.clone(), value.to_string()));
            Ok(())
        });
        async move { result }
    }
}

impl BacklinkIndex for MemoryStore {
    fn add_backlink<'a>(
        &'a self,
        target: &'a str,
        source: &'a DocumentAddress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        let result = self.with(|inner| {
            if inner.failing_targets.contains(target) {
                return Err(PersistenceError::backend(format!("cannot link {target}")));
            }
            inner
                .backlinks
                .entry(SmolStr::new(target))
                .or_default()
                .insert(source.clone());
            Ok(())
        });
        async move { result }
    }

    fn remove_backlink<'a>(
        &'a self,
        target: &'a str,
        source: &'a DocumentAddress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        let result = self.with(|inner| {
            if inner.failing_targets.contains(target) {
                return Err(PersistenceError::backend(format!("cannot unlink {target}")));
            }
            if let Some(sources) = inner.backlinks.get_mut(target) {
                sources.remove(source);
            }
            Ok(())
        });
        async move { result }
    }
}

impl BackupSink for MemoryStore {
    fn backup<'a>(
        &'a self,
        address: &'a DocumentAddress,
        value: &'a str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        let backup = DocumentAddress::new(format!("{address}.backup"));
        let value = value.to_string();
        self.with(|inner| inner.saves.push((backup, value)));
        async { Ok(()) }
    }
}

/// Copy the current document to `sink` on every tick of `schedule`.
///
/// `current` is polled on each tick; ticks with no open document are
/// skipped. Runs until `current` returns `Err(())`, meaning the session is
/// gone.
pub async fn run_backups<K, F, Fut>(sink: K, schedule: BackupSchedule, mut current: F)
where
    K: BackupSink,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<(DocumentAddress, String)>, ()>>,
{
    let mut ticker = tokio::time::interval(schedule.period());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    let mut last_backed_up: Option<String> = None;
    loop {
        ticker.tick().await;
        let (address, value) = match current().await {
            Ok(Some(open)) => open,
            Ok(None) => continue,
            Err(()) => break,
        };
        if last_backed_up.as_deref() == Some(value.as_str()) {
            continue;
        }
        match sink.backup(&address, &value).await {
            Ok(()) => {
                debug!(%address, "backup written");
                last_backed_up = Some(value);
            }
            Err(e) => warn!(%address, "backup failed: {e}"),
        }
    }
}

//! Documents and backlinks kept in a plain directory.
//!
//! Each document is `<address>.json` under the store root. Backlinks live in
//! a single `backlinks.json` mapping concept names to the addresses that
//! mention them.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use outline_editor_crdt::{BacklinkIndex, DocumentAddress, DocumentStore, PersistenceError, ReferenceDiff};
use tokio::sync::Mutex;

type Backlinks = BTreeMap<String, BTreeSet<DocumentAddress>>;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, address: &DocumentAddress) -> Result<PathBuf, PersistenceError> {
        let name = address.as_str();
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(PersistenceError::backend(format!(
                "address {name:?} is not a file name"
            )));
        }
        Ok(self.root.join(format!("{name}.json")))
    }
}

impl DocumentStore for FileStore {
    fn load<'a>(
        &'a self,
        address: &'a DocumentAddress,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send + 'a {
        async move {
            let path = self.document_path(address)?;
            match tokio::fs::read_to_string(&path).await {
                Ok(value) => Ok(value),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Err(PersistenceError::NotFound {
                    address: address.to_string(),
                }),
                Err(e) => Err(PersistenceError::backend(format!("{}: {e}", path.display()))),
            }
        }
    }

    fn save<'a>(
        &'a self,
        address: &'a DocumentAddress,
        value: &'a str,
        _references: &'a ReferenceDiff,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        async move {
            let path = self.document_path(address)?;
            tokio::fs::write(&path, value)
                .await
                .map_err(|e| PersistenceError::backend(format!("{}: {e}", path.display())))?;
            tracing::debug!(path = %path.display(), bytes = value.len(), "document written");
            Ok(())
        }
    }
}

/// Backlink index stored as one JSON file.
///
/// Updates read, modify and rewrite the whole file under a lock, so
/// concurrent fan-out from one process is serialized.
#[derive(Debug)]
pub struct FileBacklinks {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileBacklinks {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Addresses that reference `target`.
    pub async fn sources(&self, target: &str) -> Result<BTreeSet<DocumentAddress>, PersistenceError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(target).unwrap_or_default())
    }

    async fn read(&self) -> Result<Backlinks, PersistenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(Backlinks::new()),
            Ok(text) => serde_json::from_str(&text).map_err(PersistenceError::backend),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Backlinks::new()),
            Err(e) => Err(PersistenceError::backend(e)),
        }
    }

    async fn update(&self, edit: impl FnOnce(&mut Backlinks)) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().await;
        let mut backlinks = self.read().await?;
        edit(&mut backlinks);
        let text = serde_json::to_string_pretty(&backlinks).map_err(PersistenceError::backend)?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(PersistenceError::backend)
    }
}

impl BacklinkIndex for FileBacklinks {
    fn add_backlink<'a>(
        &'a self,
        target: &'a str,
        source: &'a DocumentAddress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        self.update(move |backlinks| {
            backlinks
                .entry(target.to_string())
                .or_default()
                .insert(source.clone());
        })
    }

    fn remove_backlink<'a>(
        &'a self,
        target: &'a str,
        source: &'a DocumentAddress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'a {
        self.update(move |backlinks| {
            if let Some(sources) = backlinks.get_mut(target) {
                sources.remove(source);
                if sources.is_empty() {
                    backlinks.remove(target);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_documents_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let address = DocumentAddress::new("notes");

        assert!(matches!(
            store.load(&address).await,
            Err(PersistenceError::NotFound { .. })
        ));
        store
            .save(&address, "[]", &ReferenceDiff::default())
            .await
            .unwrap();
        assert_eq!(store.load(&address).await.unwrap(), "[]");
        assert!(dir.path().join("notes.json").exists());
    }

    #[tokio::test]
    async fn test_address_must_be_a_file_name() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        for bad in ["../escape", "a/b", ".hidden", ""] {
            assert!(matches!(
                store.load(&DocumentAddress::new(bad)).await,
                Err(PersistenceError::Backend { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_backlinks_persist() {
        let dir = TempDir::new().unwrap();
        let index = FileBacklinks::new(dir.path().join("backlinks.json"));
        let a = DocumentAddress::new("a");
        let b = DocumentAddress::new("b");

        index.add_backlink("Rust", &a).await.unwrap();
        index.add_backlink("Rust", &b).await.unwrap();
        index.remove_backlink("Rust", &a).await.unwrap();
        index.remove_backlink("Absent", &a).await.unwrap();

        let reopened = FileBacklinks::new(index.path());
        assert_eq!(reopened.sources("Rust").await.unwrap(), BTreeSet::from([b]));
        assert!(reopened.sources("Absent").await.unwrap().is_empty());
    }
}

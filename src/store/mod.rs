//! Local key-value store with three independent collections.
//!
//! The store opens lazily on first use. Concurrent first callers share a single
//! open, and writes to a collection are serialized so a write that starts after
//! another finishes is always observed after it.

pub mod backend;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub use backend::{JsonFileBackend, Records, StorageBackend};

use crate::error::{AppError, AppResult};

/// Key of the singleton record in the settings and history collections.
pub const SINGLETON_KEY: &str = "global";

/// A named group of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Per-folder records keyed by folder id.
    Folders,
    /// Global settings singleton.
    Settings,
    /// Global play history singleton.
    History,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Folders, Collection::Settings, Collection::History];

    pub fn name(self) -> &'static str {
        match self {
            Self::Folders => "folders",
            Self::Settings => "settings",
            Self::History => "history",
        }
    }

    /// Schema version that introduced the collection.
    pub fn since_version(self) -> u32 {
        match self {
            Self::Folders | Self::Settings => 1,
            Self::History => 2,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The opened store: cached collections plus one writer lock per collection.
#[derive(Debug)]
struct StoreHandle {
    collections: RwLock<HashMap<Collection, Records>>,
    writers: HashMap<Collection, Mutex<()>>,
}

impl StoreHandle {
    fn new(collections: HashMap<Collection, Records>) -> Self {
        let writers = Collection::ALL
            .into_iter()
            .map(|collection| (collection, Mutex::new(())))
            .collect();

        Self {
            collections: RwLock::new(collections),
            writers,
        }
    }

    fn writer(&self, collection: Collection) -> &Mutex<()> {
        &self.writers[&collection]
    }

    fn snapshot(&self, collection: Collection) -> Records {
        self.collections
            .read()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    fn commit(&self, collection: Collection, records: Records) {
        self.collections.write().insert(collection, records);
    }
}

/// Async facade over a [`StorageBackend`].
#[derive(Debug)]
pub struct LocalStore {
    backend: Arc<dyn StorageBackend>,
    handle: OnceCell<Arc<StoreHandle>>,
}

impl LocalStore {
    /// Create a store over `backend`. Opening is deferred to first use.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            handle: OnceCell::new(),
        }
    }

    /// Create a store persisted as JSON files under `dir`.
    pub fn json(dir: impl AsRef<Path>) -> Self {
        Self::new(Arc::new(JsonFileBackend::new(dir)))
    }

    async fn handle(&self) -> AppResult<&Arc<StoreHandle>> {
        self.handle
            .get_or_try_init(|| async {
                let backend = self.backend.clone();
                let collections = blocking(move || backend.open()).await?;
                tracing::info!(
                    folders = collections.get(&Collection::Folders).map_or(0, |r| r.len()),
                    "Opened local store"
                );
                Ok::<_, AppError>(Arc::new(StoreHandle::new(collections)))
            })
            .await
    }

    /// Fetch one record.
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> AppResult<Option<T>> {
        let handle = self.handle().await?;
        let value = handle
            .collections
            .read()
            .get(&collection)
            .and_then(|records| records.get(key))
            .cloned();

        Ok(value.map(serde_json::from_value::<T>).transpose()?)
    }

    /// Fetch every record of a collection, in key order.
    pub async fn get_all<T: DeserializeOwned>(&self, collection: Collection) -> AppResult<Vec<T>> {
        let handle = self.handle().await?;
        let values: Vec<_> = handle.snapshot(collection).into_values().collect();

        values
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(AppError::from))
            .collect()
    }

    /// Insert or wholesale replace one record.
    pub async fn put<T: Serialize>(
        &self,
        collection: Collection,
        key: &str,
        record: &T,
    ) -> AppResult<()> {
        let value = serde_json::to_value(record)?;
        let owned_key = key.to_string();
        self.write(collection, move |records| {
            records.insert(owned_key, value);
            true
        })
        .await?;

        tracing::trace!(collection = %collection, key, "Put record");
        Ok(())
    }

    /// Remove one record. Returns whether it existed.
    pub async fn delete(&self, collection: Collection, key: &str) -> AppResult<bool> {
        let owned_key = key.to_string();
        let removed = self
            .write(collection, move |records| records.remove(&owned_key).is_some())
            .await?;

        if removed {
            tracing::info!(collection = %collection, key, "Deleted record");
        }
        Ok(removed)
    }

    /// Empty every collection.
    pub async fn clear(&self) -> AppResult<()> {
        let handle = self.handle().await?.clone();
        let backend = self.backend.clone();

        detached(async move {
            let mut guards = Vec::with_capacity(Collection::ALL.len());
            for collection in Collection::ALL {
                guards.push(handle.writer(collection).lock().await);
            }

            blocking(move || backend.clear()).await?;
            for collection in Collection::ALL {
                handle.commit(collection, Records::new());
            }
            Ok(())
        })
        .await?;

        tracing::info!("Cleared local store");
        Ok(())
    }

    /// Apply `change` to a snapshot of one collection, persist it, then commit
    /// it to the cache. Nothing is written when `change` returns false.
    ///
    /// Runs on its own task: once started, persist and commit both happen even
    /// if the caller is dropped, so the cache never falls behind the disk.
    async fn write<F>(&self, collection: Collection, change: F) -> AppResult<bool>
    where
        F: FnOnce(&mut Records) -> bool + Send + 'static,
    {
        let handle = self.handle().await?.clone();
        let backend = self.backend.clone();

        detached(async move {
            let _writer = handle.writer(collection).lock().await;

            let mut records = handle.snapshot(collection);
            if !change(&mut records) {
                return Ok(false);
            }

            let records = blocking(move || {
                backend.persist(collection, &records)?;
                Ok(records)
            })
            .await?;
            handle.commit(collection, records);
            Ok(true)
        })
        .await
    }
}

/// Run a store mutation to completion independently of the awaiting caller.
async fn detached<T, Fut>(work: Fut) -> AppResult<T>
where
    Fut: std::future::Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(format!("Store task failed: {}", e)))?
}

/// Run blocking storage IO off the async worker threads.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Store task failed: {}", e)))?
}

//! Durable storage behind the local store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use super::Collection;
use crate::error::{AppError, AppResult};

/// Current on-disk schema version.
///
/// Version 1 held `folders` and `settings`; version 2 added `history`.
pub const SCHEMA_VERSION: u32 = 2;

/// The records of one collection, keyed by record key.
pub type Records = BTreeMap<String, Value>;

/// Trait for storage engines that hold the store's collections.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Open storage, apply schema upgrades, and load every collection.
    fn open(&self) -> AppResult<HashMap<Collection, Records>>;

    /// Replace the stored contents of one collection.
    fn persist(&self, collection: Collection, records: &Records) -> AppResult<()>;

    /// Empty every collection.
    fn clear(&self) -> AppResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreMeta {
    schema_version: u32,
}

/// JSON file-based backend: one file per collection plus `meta.json`.
#[derive(Debug)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Create a backend rooted at `dir`. Nothing is touched until `open`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    /// Schema version on disk, 0 for a brand-new directory.
    fn read_version(&self) -> AppResult<u32> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(0);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| store_error(&path, e))?;
        let meta: StoreMeta = serde_json::from_str(&content)?;
        Ok(meta.schema_version)
    }

    /// Create collections introduced after `from`. Collections that already
    /// exist on disk are left alone.
    fn upgrade(&self, from: u32) -> AppResult<()> {
        for collection in Collection::ALL {
            let path = self.collection_path(collection);
            if collection.since_version() > from && !path.exists() {
                write_atomic(&path, "{}")?;
                tracing::info!(collection = %collection, "Created store collection");
            }
        }

        let meta = serde_json::to_string_pretty(&StoreMeta {
            schema_version: SCHEMA_VERSION,
        })?;
        write_atomic(&self.meta_path(), &meta)?;

        tracing::info!(from, to = SCHEMA_VERSION, "Upgraded store schema");
        Ok(())
    }

    fn load(&self, collection: Collection) -> AppResult<Records> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Records::new());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| store_error(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl StorageBackend for JsonFileBackend {
    fn open(&self) -> AppResult<HashMap<Collection, Records>> {
        std::fs::create_dir_all(&self.dir).map_err(|e| store_error(&self.dir, e))?;

        let version = self.read_version()?;
        if version > SCHEMA_VERSION {
            return Err(AppError::Store(format!(
                "store at {} has schema version {}, newer than supported {}",
                self.dir.display(),
                version,
                SCHEMA_VERSION
            )));
        }
        if version < SCHEMA_VERSION {
            self.upgrade(version)?;
        }

        let mut collections = HashMap::new();
        for collection in Collection::ALL {
            let records = self.load(collection)?;
            tracing::debug!(collection = %collection, count = records.len(), "Loaded collection");
            collections.insert(collection, records);
        }

        Ok(collections)
    }

    fn persist(&self, collection: Collection, records: &Records) -> AppResult<()> {
        let content = serde_json::to_string_pretty(records)?;
        write_atomic(&self.collection_path(collection), &content)?;

        tracing::debug!(collection = %collection, count = records.len(), "Persisted collection");
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        for collection in Collection::ALL {
            write_atomic(&self.collection_path(collection), "{}")?;
        }
        Ok(())
    }
}

/// Write atomically using a temp file.
fn write_atomic(path: &Path, content: &str) -> AppResult<()> {
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content).map_err(|e| store_error(&temp_path, e))?;
    std::fs::rename(&temp_path, path).map_err(|e| store_error(path, e))?;
    Ok(())
}

fn store_error(path: &Path, err: std::io::Error) -> AppError {
    AppError::Store(format!("{}: {}", path.display(), err))
}

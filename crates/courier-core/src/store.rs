//! Small key-value capabilities used for the ledger and the calendar state.
//!
//! [`Reader`] is the read-only view; [`ReadWriter`] adds durable writes. The
//! file-backed [`JsonStore`] rewrites its whole file atomically on every
//! mutation, so a crash leaves either the previous or the new state on disk.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::SeenRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize store: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait Reader<V> {
    fn get(&self, key: &str) -> Option<&V>;

    fn len(&self) -> usize;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait ReadWriter<V>: Reader<V> {
    /// Stores `value`; when this returns `Ok` the write is durable.
    fn set(&mut self, key: &str, value: V) -> Result<(), StoreError>;

    fn remove(&mut self, key: &str) -> Result<Option<V>, StoreError>;
}

/// The durable entry-id -> [`SeenRecord`] mapping.
pub type Ledger = dyn ReadWriter<SeenRecord> + Send;

/// JSON object file exposed as a key-value store.
#[derive(Debug)]
pub struct JsonStore<V> {
    path: PathBuf,
    data: BTreeMap<String, V>,
}

impl<V> JsonStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Opens `path`, treating a missing or unreadable file as an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = %path.display(), "Using state file");
        let data = load_object(&path);
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// An in-memory copy that can be mutated without touching the file.
    pub fn detached(&self) -> MemoryStore<V> {
        MemoryStore {
            data: self.data.clone(),
            writes: 0,
        }
    }

    fn persist(&self, data: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let serialized = serde_json::to_string_pretty(data)?;
        write_atomically(&self.path, serialized.as_bytes()).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl<V> Reader<V> for JsonStore<V> {
    fn get(&self, key: &str) -> Option<&V> {
        self.data.get(key)
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

impl<V> ReadWriter<V> for JsonStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    fn set(&mut self, key: &str, value: V) -> Result<(), StoreError> {
        let mut next = self.data.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        self.data = next;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<Option<V>, StoreError> {
        if !self.data.contains_key(key) {
            return Ok(None);
        }
        let mut next = self.data.clone();
        let removed = next.remove(key);
        self.persist(&next)?;
        self.data = next;
        Ok(removed)
    }
}

fn load_object<V: DeserializeOwned>(path: &Path) -> BTreeMap<String, V> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "State file not found; starting empty");
            return BTreeMap::new();
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Could not read state file; starting empty");
            return BTreeMap::new();
        }
    };

    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Invalid JSON in state file; starting empty");
            return BTreeMap::new();
        }
    };

    if !value.is_object() {
        warn!(path = %path.display(), "Expected a JSON object in state file; starting empty");
        return BTreeMap::new();
    }

    match serde_json::from_value(value) {
        Ok(data) => data,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Unexpected state file layout; starting empty");
            BTreeMap::new()
        }
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let temp_path = build_temp_path(path);
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MemoryStore<V> {
    data: BTreeMap<String, V>,
    writes: usize,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            data: BTreeMap::new(),
            writes: 0,
        }
    }
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set`/`remove` calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl<V> Reader<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<&V> {
        self.data.get(key)
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

impl<V> ReadWriter<V> for MemoryStore<V> {
    fn set(&mut self, key: &str, value: V) -> Result<(), StoreError> {
        self.data.insert(key.to_string(), value);
        self.writes += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<Option<V>, StoreError> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.writes += 1;
        }
        Ok(removed)
    }
}

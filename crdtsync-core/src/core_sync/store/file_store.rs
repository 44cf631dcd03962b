/*
    file_store.rs - File-backed key-value store

    One JSON file per key under a root directory. Key segments separated by
    '/' become subdirectories. Writes go to a temporary file which is then
    renamed over the target, so a crash never leaves a half-written value.
*/

use super::kv::{KeyValueStore, StoredValue};
use crate::clock::{Clock, SystemClock};
use crate::core_sync::store::errors::{SyncError, SyncResult};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        FileStore {
            root: root.into(),
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_key(key: &str) -> SyncResult<()> {
        let bad = key.is_empty()
            || key
                .split('/')
                .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'));
        if bad {
            return Err(SyncError::Storage(format!("invalid key: {:?}", key)));
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> SyncResult<PathBuf> {
        Self::validate_key(key)?;
        let mut path = self.root.clone();
        let mut segments = key.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{}.{}", segment, EXTENSION));
            }
        }
        Ok(path)
    }

    async fn read_stored(&self, path: &Path) -> SyncResult<Option<StoredValue>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn collect_keys(&self, dir: PathBuf, prefix: String, out: &mut Vec<String>) -> SyncResult<()> {
        let mut pending = vec![(dir, prefix)];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.file_type().await?.is_dir() {
                    pending.push((path, format!("{}{}/", prefix, name)));
                } else if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        out.push(format!("{}{}", prefix, stem));
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn store(&self, key: &str, value: Value, ttl: Option<Duration>) -> SyncResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let stored = StoredValue::new(value, ttl, self.clock.now_millis());
        let bytes = serde_json::to_vec_pretty(&stored)?;

        let mut temp_name = path.clone().into_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key, bytes = bytes.len(), "Stored value");
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> SyncResult<Option<Value>> {
        let path = self.path_for(key)?;
        match self.read_stored(&path).await? {
            Some(stored) if stored.is_expired(self.clock.now_millis()) => {
                let _ = fs::remove_file(&path).await;
                Ok(None)
            }
            Some(stored) => Ok(Some(stored.value)),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> SyncResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, prefix: &str) -> SyncResult<Vec<String>> {
        let mut all = Vec::new();
        self.collect_keys(self.root.clone(), String::new(), &mut all).await?;

        let now = self.clock.now_millis();
        let mut keys = Vec::new();
        for key in all.into_iter().filter(|k| k.starts_with(prefix)) {
            let path = self.path_for(&key)?;
            if let Some(stored) = self.read_stored(&path).await? {
                if !stored.is_expired(now) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

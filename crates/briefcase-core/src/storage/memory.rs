//! In-memory blob store for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{validate_relative_path, BlobStore, DirListing};
use crate::{Error, Result};

/// Blob store keeping every blob in a map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.blobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn normalize(path: &Path) -> Result<PathBuf> {
    validate_relative_path(path)?;
    Ok(path
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = normalize(path)?;
        Ok(self.lock().contains_key(&key))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = normalize(path)?;
        self.lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.display().to_string()))
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let key = normalize(path)?;
        if key.as_os_str().is_empty() {
            return Err(Error::InvalidInput("blob path has no file name".to_string()));
        }
        self.lock().insert(key, bytes.to_vec());
        Ok(())
    }

    async fn list_dir(&self, path: &Path) -> Result<DirListing> {
        let prefix = normalize(path)?;
        let mut dirs = BTreeSet::new();
        let mut files = BTreeSet::new();

        for key in self.lock().keys() {
            let Ok(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            let name = first.as_os_str().to_string_lossy().into_owned();
            if components.next().is_some() {
                dirs.insert(name);
            } else {
                files.insert(name);
            }
        }

        Ok(DirListing {
            dirs: dirs.into_iter().collect(),
            files: files.into_iter().collect(),
        })
    }
}

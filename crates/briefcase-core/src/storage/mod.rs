//! Blob storage abstractions for the local mirror.

mod local;
mod memory;

use std::path::{Component, Path};

use async_trait::async_trait;

use crate::{Error, Result};

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// Entries directly under one directory, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

impl DirListing {
    pub fn has_dir(&self, name: &str) -> bool {
        self.dirs.iter().any(|dir| dir == name)
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.iter().any(|file| file == name)
    }
}

/// File storage keyed by relative paths.
///
/// `write` must be atomic: a reader never observes a partially written blob
/// at its final path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether a blob exists at `path`.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read the full blob at `path`.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Store `bytes` at `path`, replacing any existing blob.
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// List the directories and blobs directly under `path`.
    ///
    /// A missing directory lists as empty.
    async fn list_dir(&self, path: &Path) -> Result<DirListing>;
}

/// Reject paths that could escape the store root.
pub(crate) fn validate_relative_path(path: &Path) -> Result<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidInput(format!(
                    "blob path must be relative and stay inside the store: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

//! Filesystem-backed blob store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{validate_relative_path, BlobStore, DirListing};
use crate::{Error, Result};

const PART_SUFFIX: &str = ".part";

/// Blob store rooted at a local directory.
///
/// Writes land in a hidden `.part` file next to the destination and are
/// renamed into place once fully flushed.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        validate_relative_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn exists(&self, path: &Path) -> Result<bool> {
        let target = self.resolve(path)?;
        match tokio::fs::metadata(&target).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target).await.map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                error.into()
            }
        })
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        let (Some(parent), Some(file_name)) = (target.parent(), target.file_name()) else {
            return Err(Error::InvalidInput(format!(
                "blob path has no file name: {}",
                path.display()
            )));
        };
        tokio::fs::create_dir_all(parent).await?;

        let temp = parent.join(format!(
            ".{}.{}{PART_SUFFIX}",
            file_name.to_string_lossy(),
            Uuid::now_v7().simple()
        ));
        if let Err(error) = write_synced(&temp, bytes).await {
            tokio::fs::remove_file(&temp).await.ok();
            return Err(Error::Storage(format!(
                "failed to write {}: {error}",
                path.display()
            )));
        }
        if let Err(error) = tokio::fs::rename(&temp, &target).await {
            tokio::fs::remove_file(&temp).await.ok();
            return Err(Error::Storage(format!(
                "failed to finalize {}: {error}",
                path.display()
            )));
        }

        tracing::debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    async fn list_dir(&self, path: &Path) -> Result<DirListing> {
        let target = self.resolve(path)?;
        let mut entries = match tokio::fs::read_dir(&target).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Ok(DirListing::default())
            }
            Err(error) => return Err(error.into()),
        };

        let mut listing = DirListing::default();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                listing.dirs.push(name);
            } else if file_type.is_file() && !name.ends_with(PART_SUFFIX) {
                listing.files.push(name);
            }
        }
        listing.dirs.sort();
        listing.files.sort();
        Ok(listing)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

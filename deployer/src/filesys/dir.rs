//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.path).await.map_err(|e| {
            DeployError::Write(format!("create directory {}: {}", self.path.display(), e))
        })
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await.map_err(|e| {
                DeployError::Write(format!("remove directory {}: {}", self.path.display(), e))
            })?;
        }
        Ok(())
    }

    /// List the direct entries of the directory, sorted by name
    pub async fn list_entries(&self) -> Result<Vec<PathBuf>, DeployError> {
        let read_err =
            |e: std::io::Error| DeployError::Internal(format!("read {}: {}", self.path.display(), e));

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&self.path).await.map_err(read_err)?;
        while let Some(entry) = reader.next_entry().await.map_err(read_err)? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Recursively copy the contents of this directory into `dest`.
    /// Symlinks are followed; a link back into a directory already being
    /// copied is skipped.
    pub async fn copy_to(&self, dest: &Dir) -> Result<(), DeployError> {
        let copy_err = |path: &Path, e: std::io::Error| {
            DeployError::Write(format!("copy {}: {}", path.display(), e))
        };

        dest.create().await?;
        let root = fs::canonicalize(&self.path)
            .await
            .map_err(|e| copy_err(&self.path, e))?;
        let mut pending = vec![(self.path.clone(), dest.path.clone(), vec![root])];
        while let Some((src, dst, ancestors)) = pending.pop() {
            let mut reader = fs::read_dir(&src).await.map_err(|e| copy_err(&src, e))?;
            while let Some(entry) = reader.next_entry().await.map_err(|e| copy_err(&src, e))? {
                let from = entry.path();
                let to = dst.join(entry.file_name());
                let file_type = entry.file_type().await.map_err(|e| copy_err(&from, e))?;
                let is_dir = if file_type.is_symlink() {
                    fs::metadata(&from)
                        .await
                        .map_err(|e| copy_err(&from, e))?
                        .is_dir()
                } else {
                    file_type.is_dir()
                };

                if !is_dir {
                    fs::copy(&from, &to).await.map_err(|e| copy_err(&from, e))?;
                    continue;
                }
                let real = fs::canonicalize(&from)
                    .await
                    .map_err(|e| copy_err(&from, e))?;
                if ancestors.contains(&real) {
                    debug!("skipping symlink cycle at {}", from.display());
                    continue;
                }
                fs::create_dir_all(&to).await.map_err(|e| copy_err(&to, e))?;
                let mut chain = ancestors.clone();
                chain.push(real);
                pending.push((from, to, chain));
            }
        }
        Ok(())
    }

    /// Total size of all files below this directory in KiB, rounded up
    pub async fn size_kib(&self) -> Result<u64, DeployError> {
        let size_err = |path: &Path, e: std::io::Error| {
            DeployError::LocalCapacity(format!("measure {}: {}", path.display(), e))
        };

        let mut total: u64 = 0;
        let mut pending = vec![self.path.clone()];
        while let Some(dir) = pending.pop() {
            let mut reader = fs::read_dir(&dir).await.map_err(|e| size_err(&dir, e))?;
            while let Some(entry) = reader.next_entry().await.map_err(|e| size_err(&dir, e))? {
                let path = entry.path();
                let meta = fs::symlink_metadata(&path)
                    .await
                    .map_err(|e| size_err(&path, e))?;
                if meta.is_dir() {
                    pending.push(path);
                } else {
                    total += meta.len();
                }
            }
        }
        Ok(total.div_ceil(1024))
    }

    /// Replace `dest` with this directory by renaming it into place
    pub async fn move_to(&self, dest: &Dir) -> Result<(), DeployError> {
        dest.delete().await?;
        if let Some(parent) = dest.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                DeployError::Write(format!("create directory {}: {}", parent.display(), e))
            })?;
        }
        fs::rename(&self.path, &dest.path).await.map_err(|e| {
            DeployError::Write(format!(
                "move {} to {}: {}",
                self.path.display(),
                dest.path.display(),
                e
            ))
        })
    }
}

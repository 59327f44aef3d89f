//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::DeployError;

/// A file wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, DeployError> {
        fs::read_to_string(&self.path)
            .await
            .map_err(|e| DeployError::Internal(format!("read {}: {}", self.path.display(), e)))
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, DeployError> {
        let contents = self.read_string().await?;
        serde_json::from_str(&contents)
            .map_err(|e| DeployError::Internal(format!("parse {}: {}", self.path.display(), e)))
    }

    /// Write string to file
    pub async fn write_string(&self, contents: &str) -> Result<(), DeployError> {
        self.write_bytes(contents.as_bytes()).await
    }

    /// Write bytes to file
    pub async fn write_bytes(&self, contents: &[u8]) -> Result<(), DeployError> {
        let write_err =
            |e: std::io::Error| DeployError::Write(format!("{}: {}", self.path.display(), e));

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut file = fs::File::create(&self.path).await.map_err(write_err)?;
        file.write_all(contents).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        Ok(())
    }

    /// Write JSON to file
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), DeployError> {
        let contents = serde_json::to_string(value)
            .map_err(|e| DeployError::Write(format!("{}: {}", self.path.display(), e)))?;
        self.write_string(&contents).await
    }

    /// Copy this file to `dest`, creating its parent directory
    pub async fn copy_to(&self, dest: &File) -> Result<(), DeployError> {
        let copy_err = |e: std::io::Error| {
            DeployError::Write(format!(
                "copy {} to {}: {}",
                self.path.display(),
                dest.path.display(),
                e
            ))
        };
        if let Some(parent) = dest.path.parent() {
            fs::create_dir_all(parent).await.map_err(copy_err)?;
        }
        fs::copy(&self.path, &dest.path).await.map_err(copy_err)?;
        Ok(())
    }

    /// Delete the file
    pub async fn delete(&self) -> Result<(), DeployError> {
        if self.exists().await {
            fs::remove_file(&self.path).await.map_err(|e| {
                DeployError::Write(format!("remove {}: {}", self.path.display(), e))
            })?;
        }
        Ok(())
    }
}

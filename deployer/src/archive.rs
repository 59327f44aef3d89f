//! Extraction of uploaded code archives

use std::io::Cursor;
use std::path::PathBuf;

use tracing::debug;

use crate::errors::DeployError;

/// Extract a zip archive held in memory into `dest`, returning the number of
/// entries it contained
pub async fn unzip_bytes(bytes: Vec<u8>, dest: PathBuf) -> Result<usize, DeployError> {
    let size = bytes.len();
    let target = dest.clone();

    let entries = tokio::task::spawn_blocking(move || -> Result<usize, String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
        std::fs::create_dir_all(&target).map_err(|e| e.to_string())?;
        archive.extract(&target).map_err(|e| e.to_string())?;
        Ok(archive.len())
    })
    .await
    .map_err(|e| DeployError::Internal(format!("unzip task failed: {}", e)))?
    .map_err(|e| DeployError::DeviceDeployCode(format!("unzip uploaded code failed: {}", e)))?;

    debug!("extracted {} entries ({} bytes) into {}", entries, size, dest.display());
    Ok(entries)
}

//! Remote file operations: directory creation, secure copy and the disk
//! capacity precheck

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{DeployError, DeployScope};
use crate::remote::classify::device_failure;
use crate::remote::transport::{normalize_remote, shell_quote, DeviceTransport, RemoteTarget};

/// File operations on a device, failures attributed to one deploy scope
#[derive(Clone)]
pub struct RemoteFs {
    transport: Arc<dyn DeviceTransport>,
    scope: DeployScope,
}

impl RemoteFs {
    pub fn new(transport: Arc<dyn DeviceTransport>, scope: DeployScope) -> Self {
        Self { transport, scope }
    }

    /// `mkdir -p` on the device; an existing directory is fine
    pub async fn create_remote_directory(
        &self,
        target: &RemoteTarget,
        path: &str,
    ) -> Result<(), DeployError> {
        let command = format!("mkdir -p {}", shell_quote(path));
        let output = self
            .transport
            .exec(target, &command)
            .await
            .map_err(|e| device_failure(e.message(), self.scope))?;

        if !output.is_clean() {
            let reason = if output.stderr.trim().is_empty() {
                format!("create directory {} failed", path)
            } else {
                format!("create directory {} failed: {}", path, output.stderr.trim())
            };
            return Err(device_failure(&reason, self.scope));
        }
        debug!("created {}:{}", target.hostname, path);
        Ok(())
    }

    /// Copy `source` to `destination`. A directory source contributes its
    /// entries, not itself. Returns the normalized destination.
    pub async fn sync_files(
        &self,
        target: &RemoteTarget,
        source: &Path,
        destination: &str,
    ) -> Result<String, DeployError> {
        let sources = expand_source(source).await?;
        let destination = normalize_remote(destination);
        if sources.is_empty() {
            debug!("{} is empty, nothing to copy", source.display());
            return Ok(destination);
        }

        self.transport
            .copy(target, &sources, &destination)
            .await
            .map_err(|e| device_failure(e.message(), self.scope))?;
        info!(
            "copied {} entries to {}:{}",
            sources.len(),
            target.hostname,
            destination
        );
        Ok(destination)
    }

    /// Fail with [`DeployError::RemoteCapacity`] unless the filesystem that
    /// will hold `path` has at least `required_kib` available. The path may
    /// not exist yet; its deepest existing ancestor is measured.
    pub async fn measure_remote_available_space(
        &self,
        target: &RemoteTarget,
        path: &str,
        required_kib: u64,
    ) -> Result<u64, DeployError> {
        let disk = self.disk_free(target, path).await?;
        check_required(target, path, &disk, required_kib)?;
        Ok(disk.available_kib)
    }

    /// Capacity check for several destinations at once. Payloads landing on
    /// the same mount are added up before comparing.
    pub async fn check_remote_capacity(
        &self,
        target: &RemoteTarget,
        needs: &[(&str, u64)],
    ) -> Result<(), DeployError> {
        let mut mounts: Vec<(DiskFree, u64, &str)> = Vec::with_capacity(needs.len());
        for (path, required_kib) in needs {
            let disk = self.disk_free(target, path).await?;
            match mounts.iter_mut().find(|(seen, _, _)| seen.mount == disk.mount) {
                Some((_, total, _)) => *total += required_kib,
                None => mounts.push((disk, *required_kib, *path)),
            }
        }
        for (disk, total, path) in &mounts {
            check_required(target, path, disk, *total)?;
        }
        Ok(())
    }

    async fn disk_free(&self, target: &RemoteTarget, path: &str) -> Result<DiskFree, DeployError> {
        let output = self
            .transport
            .exec(target, &disk_free_command(path))
            .await
            .map_err(|e| device_failure(e.message(), self.scope))?;

        parse_df(&output.stdout).ok_or_else(|| {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            DeployError::DeviceConnect(format!(
                "connect to device error: unable to read free space: {}",
                detail
            ))
        })
    }
}

/// One filesystem as reported by `df -Pk`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskFree {
    pub available_kib: u64,
    pub mount: String,
}

fn check_required(
    target: &RemoteTarget,
    path: &str,
    disk: &DiskFree,
    required_kib: u64,
) -> Result<(), DeployError> {
    debug!(
        "need: {} KB, available: {} KB on {}",
        required_kib, disk.available_kib, disk.mount
    );
    if disk.available_kib < required_kib {
        warn!(
            "{} has {} KB available under {}, need {} KB",
            target.hostname, disk.available_kib, path, required_kib
        );
        return Err(DeployError::RemoteCapacity(format!(
            "check memory space failed - need {} KB",
            required_kib
        )));
    }
    Ok(())
}

async fn expand_source(source: &Path) -> Result<Vec<PathBuf>, DeployError> {
    let metadata = tokio::fs::metadata(source).await.map_err(|e| {
        DeployError::Internal(format!("unable to read {}: {}", source.display(), e))
    })?;
    if !metadata.is_dir() {
        return Ok(vec![source.to_path_buf()]);
    }

    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(source).await.map_err(|e| {
        DeployError::Internal(format!("unable to list {}: {}", source.display(), e))
    })?;
    while let Some(entry) = reader.next_entry().await.map_err(|e| {
        DeployError::Internal(format!("unable to list {}: {}", source.display(), e))
    })? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// `df -Pk` on the deepest existing ancestor of `path`
pub fn disk_free_command(path: &str) -> String {
    format!(
        "p={}; while [ ! -e \"$p\" ]; do p=$(dirname \"$p\"); done; df -Pk \"$p\"",
        shell_quote(path)
    )
}

/// Available KiB and mount point from POSIX `df -Pk` output
pub fn parse_df(stdout: &str) -> Option<DiskFree> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    let available_kib = fields.get(3)?.parse().ok()?;
    // mount points may contain spaces
    let mount = fields.get(5..).filter(|rest| !rest.is_empty())?.join(" ");
    Some(DiskFree {
        available_kib,
        mount,
    })
}

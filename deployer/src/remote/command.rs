//! Detached script execution on a device
//!
//! A script is staged next to `commandAgent.sh` under
//! `/home/{user}/bundle/command_{thing}` and launched in the background. Its
//! output streams land in `{stream}_{uid}.log` files that are read back later.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{DeployError, DeployScope};
use crate::remote::classify::device_failure;
use crate::remote::fs::RemoteFs;
use crate::remote::transport::{normalize_remote, shell_quote, DeviceTransport, RemoteTarget};
use crate::storage::layout::StorageLayout;
use crate::utils::generate_uuid;

pub const COMMAND_AGENT: &str = "commandAgent.sh";

const MISSING_FILE: &str = "No such file or directory";

/// Output stream of a launched script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which streams of a script are kept on the device
#[derive(Debug, Clone, Copy, Default)]
pub struct Capture {
    pub stdout: bool,
    pub stderr: bool,
}

/// Remote directory holding the scripts and logs of a thing
pub fn command_dir(username: &str, thing_id: &str) -> String {
    normalize_remote(&format!("/home/{}/bundle/command_{}", username, thing_id))
}

/// Launches scripts on devices and reads their logs
#[derive(Clone)]
pub struct DeviceCommandRunner {
    transport: Arc<dyn DeviceTransport>,
    remote_fs: RemoteFs,
    layout: StorageLayout,
}

impl DeviceCommandRunner {
    pub fn new(transport: Arc<dyn DeviceTransport>, layout: StorageLayout) -> Self {
        Self {
            remote_fs: RemoteFs::new(Arc::clone(&transport), DeployScope::Command),
            transport,
            layout,
        }
    }

    /// Stage and launch `script`, returning the run uid. The local copy of
    /// the script is removed whatever the outcome.
    pub async fn execute_command(
        &self,
        target: &RemoteTarget,
        thing_id: &str,
        script: &str,
        capture: Capture,
    ) -> Result<String, DeployError> {
        let uid = generate_uuid();
        let script_name = format!("command_{}.sh", uid);
        let local_dir = self.layout.command_dir();
        let local_script = local_dir.file(&script_name);
        local_script.write_string(script).await?;

        let outcome = self
            .stage_and_launch(target, thing_id, &uid, &script_name, capture)
            .await;

        if let Err(e) = local_script.delete().await {
            warn!("unable to remove {}: {}", local_script.path().display(), e);
        }
        outcome.map(|_| uid)
    }

    async fn stage_and_launch(
        &self,
        target: &RemoteTarget,
        thing_id: &str,
        uid: &str,
        script_name: &str,
        capture: Capture,
    ) -> Result<(), DeployError> {
        let remote_dir = command_dir(&target.username, thing_id);
        let local_dir = self.layout.command_dir();

        self.remote_fs
            .create_remote_directory(target, &remote_dir)
            .await?;
        self.remote_fs
            .sync_files(target, local_dir.file(script_name).path(), &remote_dir)
            .await?;
        self.remote_fs
            .sync_files(target, local_dir.file(COMMAND_AGENT).path(), &remote_dir)
            .await?;

        let log_path = |stream: LogStream, keep: bool| {
            if keep {
                format!("{}/{}_{}.log", remote_dir, stream, uid)
            } else {
                "/dev/null".to_string()
            }
        };
        let launch = format!(
            "chmod a+x {script} && cd {dir} && nohup sh {agent} {uid} {stderr} {stdout} > /dev/null 2>&1 &",
            script = shell_quote(&format!("{}/{}", remote_dir, script_name)),
            dir = shell_quote(&remote_dir),
            agent = COMMAND_AGENT,
            uid = uid,
            stderr = shell_quote(&log_path(LogStream::Stderr, capture.stderr)),
            stdout = shell_quote(&log_path(LogStream::Stdout, capture.stdout)),
        );

        let output = self
            .transport
            .exec(target, &launch)
            .await
            .map_err(|e| device_failure(e.message(), DeployScope::Command))?;
        if output.exit_status.unwrap_or(0) != 0 {
            return Err(device_failure(
                &format!("execute command fail: {}", output.stderr.trim()),
                DeployScope::Command,
            ));
        }
        info!("launched command {} on {}", uid, target.hostname);
        Ok(())
    }

    /// Read one log of a launched script. Relative references to the
    /// script are rewritten to its remote path; an empty log reads as `" "`.
    pub async fn read_command_log(
        &self,
        target: &RemoteTarget,
        thing_id: &str,
        uid: &str,
        stream: LogStream,
    ) -> Result<String, DeployError> {
        let remote_dir = command_dir(&target.username, thing_id);
        let command = format!(
            "cat {}",
            shell_quote(&format!("{}/{}_{}.log", remote_dir, stream, uid))
        );

        let output = self
            .transport
            .exec(target, &command)
            .await
            .map_err(|e| device_failure(e.message(), DeployScope::Command))?;

        if !output.stdout.is_empty() {
            let relative = format!("./command_{}.sh", uid);
            let absolute = format!("{}/command_{}.sh", remote_dir, uid);
            return Ok(output.stdout.replace(&relative, &absolute));
        }

        let stderr = output.stderr.trim();
        if stderr.contains(MISSING_FILE) {
            return Err(DeployError::LogFileNotFound(stderr.to_string()));
        }
        if !stderr.is_empty() {
            return Err(device_failure(stderr, DeployScope::Command));
        }
        Ok(" ".to_string())
    }
}

//! SSH transport
//!
//! Commands run over a russh client session opened per call. Files are copied
//! with `scp` driven through `sshpass`, which reads the password from the
//! `SSHPASS` environment variable so it never appears on a command line.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::remote::transport::{DeviceTransport, ExecOutput, RemoteTarget, TransportError};
use crate::storage::settings::DeviceSettings;

/// sshpass exit status for a rejected password
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// SSH transport options
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub port: u16,
    pub connect_timeout: Duration,
    pub exec_timeout: Duration,
    pub transfer_timeout: Duration,
    pub sshpass_path: PathBuf,
    pub scp_path: PathBuf,
}

impl From<&DeviceSettings> for SshOptions {
    fn from(settings: &DeviceSettings) -> Self {
        Self {
            port: settings.ssh_port,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            exec_timeout: Duration::from_secs(settings.exec_timeout_secs),
            transfer_timeout: Duration::from_secs(settings.transfer_timeout_secs),
            sshpass_path: settings.sshpass_path.clone(),
            scp_path: settings.scp_path.clone(),
        }
    }
}

/// Devices are provisioned on first contact, so any host key is accepted
struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

enum ExecPhase {
    Streaming,
    Closed,
    Failed(String),
}

/// Transport talking to real devices
pub struct SshTransport {
    options: SshOptions,
}

impl SshTransport {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    async fn open(&self, target: &RemoteTarget) -> Result<Handle<AcceptAnyHostKey>, TransportError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.options.exec_timeout),
            ..Default::default()
        });
        let address = (target.hostname.as_str(), self.options.port);

        let handshake = async {
            let mut session = client::connect(config, address, AcceptAnyHostKey)
                .await
                .map_err(|e| TransportError::Connect(describe_connect_error(&e)))?;
            let authenticated = session
                .authenticate_password(target.username.clone(), target.password())
                .await
                .map_err(|e| TransportError::Connect(format!("client-authentication: {}", e)))?;
            if !authenticated {
                return Err(TransportError::Connect(
                    "client-authentication: All configured authentication methods failed".to_string(),
                ));
            }
            Ok(session)
        };

        match timeout(self.options.connect_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Connect(format!(
                "client-timeout: timed out while connecting to {}:{}",
                target.hostname, self.options.port
            ))),
        }
    }

    async fn close(session: Handle<AcceptAnyHostKey>) {
        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("ssh disconnect failed: {}", e);
        }
    }
}

async fn run_exec(
    session: &mut Handle<AcceptAnyHostKey>,
    command: &str,
) -> Result<ExecOutput, TransportError> {
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| TransportError::Channel(format!("open session failed: {}", e)))?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| TransportError::Channel(format!("exec failed: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;
    let mut phase = ExecPhase::Streaming;

    while let ExecPhase::Streaming = phase {
        phase = match channel.wait().await {
            Some(ChannelMsg::Data { ref data }) => {
                stdout.extend_from_slice(data);
                ExecPhase::Streaming
            }
            Some(ChannelMsg::ExtendedData { ref data, ext: 1 }) => {
                stderr.extend_from_slice(data);
                ExecPhase::Streaming
            }
            Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                exit_status = Some(status);
                ExecPhase::Streaming
            }
            Some(ChannelMsg::Failure) => {
                ExecPhase::Failed(format!("device refused to run '{}'", command))
            }
            Some(ChannelMsg::Close) | None => ExecPhase::Closed,
            Some(_) => ExecPhase::Streaming,
        };
    }

    match phase {
        ExecPhase::Failed(message) => Err(TransportError::Channel(message)),
        _ => Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        }),
    }
}

#[async_trait]
impl DeviceTransport for SshTransport {
    async fn probe(&self, target: &RemoteTarget) -> Result<(), TransportError> {
        let session = self.open(target).await?;
        Self::close(session).await;
        Ok(())
    }

    async fn exec(&self, target: &RemoteTarget, command: &str) -> Result<ExecOutput, TransportError> {
        let mut session = self.open(target).await?;
        let outcome = match timeout(self.options.exec_timeout, run_exec(&mut session, command)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Channel(format!(
                "client-timeout: '{}' did not finish within {}s",
                command,
                self.options.exec_timeout.as_secs()
            ))),
        };
        Self::close(session).await;
        outcome
    }

    async fn copy(
        &self,
        target: &RemoteTarget,
        sources: &[PathBuf],
        destination: &str,
    ) -> Result<(), TransportError> {
        let port = self.options.port.to_string();
        let remote = format!("{}@{}:{}", target.username, target.hostname, destination);

        let mut args: Vec<String> = vec![
            "-e".to_string(),
            self.options.scp_path.display().to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-P".to_string(),
            port,
            "-r".to_string(),
        ];
        args.extend(sources.iter().map(|s| s.display().to_string()));
        args.push(remote);

        let rendered = format!("{} {}", self.options.sshpass_path.display(), args.join(" "));
        debug!("running {}", rendered);

        let mut command = Command::new(&self.options.sshpass_path);
        command
            .args(&args)
            .env("SSHPASS", target.password())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.options.transfer_timeout, command.output()).await {
            Err(_) => return Err(TransportError::Transfer("Execution timeout".to_string())),
            Ok(Err(e)) => {
                return Err(TransportError::Transfer(format!(
                    "unable to run {}: {}",
                    self.options.sshpass_path.display(),
                    e
                )))
            }
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = scp_failure_message(&stderr, &rendered, output.status.code());
        warn!("copy to {} failed: {}", target.hostname, message);
        Err(TransportError::Transfer(message))
    }
}

fn describe_connect_error(err: &russh::Error) -> String {
    match err {
        russh::Error::IO(io) => format!("client-socket: {}", io),
        other => format!("client-handshake: {}", other),
    }
}

/// Caller-facing text of a failed copy. Prefers the `scp:` line, otherwise
/// the stderr with the command line cut out.
pub fn scp_failure_message(stderr: &str, rendered_command: &str, status: Option<i32>) -> String {
    let scp_line = Regex::new(r"scp:\s(.+)")
        .ok()
        .and_then(|re| re.captures(stderr))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());
    if let Some(line) = scp_line {
        return line;
    }

    let stripped = stderr.replace(rendered_command, "").trim().to_string();
    if !stripped.is_empty() {
        return stripped;
    }
    match status {
        Some(SSHPASS_BAD_PASSWORD) => "Permission denied, please try again.".to_string(),
        Some(code) => format!("copy exited with status {}", code),
        None => "copy terminated by signal".to_string(),
    }
}

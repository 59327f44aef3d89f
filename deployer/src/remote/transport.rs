//! Device transport seam
//!
//! Every remote operation is a short-lived session: open, run one command or
//! one copy, read to completion, close.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// A device reached over SSH for the duration of one run
#[derive(Clone)]
pub struct RemoteTarget {
    pub hostname: String,
    pub username: String,
    password: SecretString,
    /// Primary destination folder of the run
    pub destination: String,
}

impl RemoteTarget {
    pub fn new(
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            password,
            destination: destination.into(),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// Output of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    /// Exited with status 0 and wrote nothing to stderr
    pub fn is_clean(&self) -> bool {
        self.exit_status.unwrap_or(0) == 0 && self.stderr.trim().is_empty()
    }
}

/// Transport-level failure, carrying the raw text the classifier matches on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Connect(String),

    #[error("{0}")]
    Channel(String),

    #[error("{0}")]
    Transfer(String),
}

impl TransportError {
    pub fn message(&self) -> &str {
        match self {
            TransportError::Connect(m) | TransportError::Channel(m) | TransportError::Transfer(m) => m,
        }
    }
}

/// Access to a device
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Open and authenticate a session, then close it
    async fn probe(&self, target: &RemoteTarget) -> Result<(), TransportError>;

    /// Run one command to completion
    async fn exec(&self, target: &RemoteTarget, command: &str) -> Result<ExecOutput, TransportError>;

    /// Copy local files or directories into a remote directory
    async fn copy(
        &self,
        target: &RemoteTarget,
        sources: &[PathBuf],
        destination: &str,
    ) -> Result<(), TransportError>;
}

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Join remote path segments
pub fn join_remote(base: &str, name: &str) -> String {
    normalize_remote(&format!("{}/{}", base, name))
}

/// Collapse duplicate separators and `.`/`..` segments of a remote path
pub fn normalize_remote(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let trailing = path.len() > 1 && path.ends_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let mut normalized = parts.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if normalized.is_empty() {
        normalized.push('.');
    }
    if trailing && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

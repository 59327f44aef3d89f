//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for the daily step log
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Management API configuration
    #[serde(default)]
    pub management: ManagementSettings,

    /// Certificate request pacing
    #[serde(default)]
    pub queue: QueueSettings,

    /// SSH/SCP access to devices
    #[serde(default)]
    pub device: DeviceSettings,

    /// Local storage roots
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    /// Read settings from a JSON file, falling back to defaults when the
    /// file does not exist
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json::<Settings>()
            .await
            .map_err(|e| DeployError::Config(format!("unable to read settings: {}", e)))
    }

    /// Apply `KONG_URI` and `QPKG_PATH` overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(kong) = lookup("KONG_URI").filter(|v| !v.is_empty()) {
            self.management.endpoint = format!("http://{}", kong.trim_end_matches('/'));
        }
        if let Some(qpkg) = lookup("QPKG_PATH").filter(|v| !v.is_empty()) {
            self.storage.function_root = PathBuf::from(qpkg).join("iot").join("functions");
        }
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), DeployError> {
        Url::parse(&self.management.endpoint).map_err(|e| {
            DeployError::Config(format!(
                "invalid management endpoint '{}': {}",
                self.management.endpoint, e
            ))
        })?;
        if self.management.api_version.is_empty() {
            return Err(DeployError::Config("api_version must not be empty".to_string()));
        }
        if self.queue.interval_ms == 0 {
            return Err(DeployError::Config("queue interval must be positive".to_string()));
        }
        Ok(())
    }
}

/// Management API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementSettings {
    /// Endpoint prefix, e.g. `http://127.0.0.1:8080/qiotapp`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Ceiling for ordinary API calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Ceiling for certificate issuance and PEM downloads
    #[serde(default = "default_certificate_timeout")]
    pub certificate_timeout_secs: u64,

    /// The management service ships a self-signed certificate
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080/qiotapp".to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_request_timeout() -> u64 {
    20
}

fn default_certificate_timeout() -> u64 {
    40
}

fn default_true() -> bool {
    true
}

impl ManagementSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn certificate_timeout(&self) -> Duration {
        Duration::from_secs(self.certificate_timeout_secs)
    }
}

impl Default for ManagementSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout(),
            certificate_timeout_secs: default_certificate_timeout(),
            accept_invalid_certs: true,
        }
    }
}

/// Request queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Minimum spacing between two queued dispatches
    #[serde(default = "default_queue_interval")]
    pub interval_ms: u64,
}

fn default_queue_interval() -> u64 {
    500
}

impl QueueSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_queue_interval(),
        }
    }
}

/// Device access settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Ceiling for a single remote command
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,

    /// Ceiling for a single secure-copy transfer
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,

    #[serde(default = "default_sshpass_path")]
    pub sshpass_path: PathBuf,

    #[serde(default = "default_scp_path")]
    pub scp_path: PathBuf,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    20
}

fn default_exec_timeout() -> u64 {
    60
}

fn default_transfer_timeout() -> u64 {
    600
}

fn default_sshpass_path() -> PathBuf {
    PathBuf::from("sshpass")
}

fn default_scp_path() -> PathBuf {
    PathBuf::from("scp")
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            ssh_port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            exec_timeout_secs: default_exec_timeout(),
            transfer_timeout_secs: default_transfer_timeout(),
            sshpass_path: default_sshpass_path(),
            scp_path: default_scp_path(),
        }
    }
}

/// Local storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Holds `qnap-qiot-sdks/`, `ssl/`, `command/` and the temp workspaces
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Cache of uploaded user functions
    #[serde(default = "default_function_root")]
    pub function_root: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_function_root() -> PathBuf {
    PathBuf::from("functions")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            function_root: default_function_root(),
        }
    }
}

//! Remote command requests

use serde::Deserialize;

use crate::models::deployment::DeviceCredentials;
use crate::remote::command::{Capture, LogStream};

/// Script to launch on a device
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub thing_id: String,
    #[serde(flatten)]
    pub credentials: DeviceCredentials,
    pub script: String,
    #[serde(default)]
    pub stdout: bool,
    #[serde(default)]
    pub stderr: bool,
}

impl CommandRequest {
    pub fn capture(&self) -> Capture {
        Capture {
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Log of a previously launched script
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLogRequest {
    pub thing_id: String,
    #[serde(flatten)]
    pub credentials: DeviceCredentials,
    pub uid: String,
    pub stream: LogStream,
}

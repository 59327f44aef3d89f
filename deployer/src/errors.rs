//! Error types for the deployer
//!
//! Every failure surfaces as exactly one [`DeployError`] variant carrying a
//! human-readable message. The numeric codes and HTTP statuses are the ones
//! the management service reports in its `{"error": [...]}` envelope.

use serde_json::{json, Value};
use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    ConnectionTimeout(String),

    #[error("{0}")]
    ConnectionError(String),

    /// The management API answered with an HTTP status >= 400
    #[error("{message}")]
    ApiStatus { status: u16, message: String },

    /// The management API answered 2xx but reported `body.error[0]`
    #[error("{message}")]
    ApiReported { code: i64, message: String },

    #[error("Failed to generate certificates: {0}")]
    Certificate(String),

    #[error("Failed to download certificate files: {0}")]
    Download(String),

    #[error("Failed to write file: {0}")]
    Write(String),

    /// Measuring the local payload failed
    #[error("Failed to measure local payload size: {0}")]
    LocalCapacity(String),

    /// The device does not have room for the payload
    #[error("Not enough disk space on the thing: {0}")]
    RemoteCapacity(String),

    #[error("Failed to connect to the thing: {0}")]
    DeviceConnect(String),

    #[error("Failed to deploy code to the thing: {0}")]
    DeviceDeployCode(String),

    #[error("Failed to deploy resources to the thing: {0}")]
    DeviceDeployResource(String),

    #[error("Uploaded function not found, please upload again: {0}")]
    FunctionNotFound(String),

    #[error("Thing failed to execute command: {0}")]
    DeviceExecuteCommand(String),

    #[error("Failed to update connection info: {0}")]
    UpdateConnectionInfo(String),

    #[error("Command log not found: {0}")]
    LogFileNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Machine-readable error code
    pub fn code(&self) -> i64 {
        match self {
            DeployError::InvalidRequest(_) => 7000,
            DeployError::ConnectionTimeout(_) => 7001,
            DeployError::ConnectionError(_) => 7002,
            DeployError::ApiStatus { .. } => 7002,
            DeployError::ApiReported { code, .. } => *code,
            DeployError::Certificate(_) => 7003,
            DeployError::Download(_) => 7004,
            DeployError::Write(_) => 7006,
            DeployError::LocalCapacity(_) => 7007,
            DeployError::DeviceConnect(_) => 7008,
            DeployError::RemoteCapacity(_) => 7009,
            DeployError::DeviceDeployCode(_) => 7010,
            DeployError::DeviceDeployResource(_) => 7011,
            DeployError::FunctionNotFound(_) => 7012,
            DeployError::DeviceExecuteCommand(_) => 7013,
            DeployError::UpdateConnectionInfo(_) => 7014,
            DeployError::LogFileNotFound(_) => 7015,
            DeployError::Config(_) | DeployError::Internal(_) => 7999,
        }
    }

    /// HTTP status the route layer answers with
    pub fn status(&self) -> u16 {
        match self {
            DeployError::InvalidRequest(_) => 400,
            DeployError::ConnectionTimeout(_) => 408,
            DeployError::ConnectionError(_) => 503,
            DeployError::ApiStatus { status, .. } => *status,
            DeployError::DeviceConnect(_)
            | DeployError::RemoteCapacity(_)
            | DeployError::DeviceDeployCode(_)
            | DeployError::DeviceDeployResource(_) => 400,
            DeployError::FunctionNotFound(_) | DeployError::LogFileNotFound(_) => 404,
            DeployError::ApiReported { .. }
            | DeployError::Certificate(_)
            | DeployError::Download(_)
            | DeployError::Write(_)
            | DeployError::LocalCapacity(_)
            | DeployError::DeviceExecuteCommand(_)
            | DeployError::UpdateConnectionInfo(_)
            | DeployError::Config(_)
            | DeployError::Internal(_) => 500,
        }
    }

    /// Error envelope in the management service format
    pub fn to_body(&self) -> Value {
        json!({
            "error": [{
                "message": self.to_string(),
                "code": self.code(),
            }]
        })
    }
}

/// The deployment kind a remote failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployScope {
    Code,
    Resource,
    Command,
}

impl DeployScope {
    /// Wrap a remote failure message into this scope's error kind
    pub fn failure(self, message: impl Into<String>) -> DeployError {
        let message = message.into();
        match self {
            DeployScope::Code => DeployError::DeviceDeployCode(message),
            DeployScope::Resource => DeployError::DeviceDeployResource(message),
            DeployScope::Command => DeployError::DeviceExecuteCommand(message),
        }
    }
}

//! Classification of raw device failure text
//!
//! The SSH layer reports failures as text. Deciding whether a failure means
//! the device is unreachable happens only here, by substring match.

use crate::errors::{DeployError, DeployScope};

/// Cause of a device failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// Credentials rejected during SSH authentication
    Authentication,
    /// TCP connect or socket failure
    Socket,
    /// Password prompt rejected by the remote tool
    PermissionDenied,
    /// Host name does not resolve
    NameResolution,
    /// Anything else, e.g. a failing remote command
    Other,
}

const PATTERNS: [(&str, FailureCause); 4] = [
    ("client-authentication", FailureCause::Authentication),
    ("client-socket", FailureCause::Socket),
    ("Permission denied, please try again.", FailureCause::PermissionDenied),
    ("Name or service not known", FailureCause::NameResolution),
];

impl FailureCause {
    /// The device could not be reached or refused the credentials
    pub fn is_unreachable(&self) -> bool {
        !matches!(self, FailureCause::Other)
    }
}

/// Map raw failure text to its cause
pub fn classify_failure(text: &str) -> FailureCause {
    PATTERNS
        .iter()
        .find(|(pattern, _)| text.contains(pattern))
        .map(|(_, cause)| *cause)
        .unwrap_or(FailureCause::Other)
}

/// Turn raw failure text into a device error: unreachable devices become
/// [`DeployError::DeviceConnect`], everything else the scope's deploy error
pub fn device_failure(text: &str, scope: DeployScope) -> DeployError {
    if classify_failure(text).is_unreachable() {
        DeployError::DeviceConnect(text.to_string())
    } else {
        scope.failure(text)
    }
}

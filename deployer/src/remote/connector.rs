//! Device reachability check

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::remote::transport::{DeviceTransport, RemoteTarget};

/// Validates SSH credentials and reachability of a device. The probe session
/// is closed right away; later steps open their own.
#[derive(Clone)]
pub struct DeviceConnector {
    transport: Arc<dyn DeviceTransport>,
}

impl DeviceConnector {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self { transport }
    }

    pub async fn test_connection(&self, target: &RemoteTarget) -> Result<(), DeployError> {
        debug!("testing connection to {}@{}", target.username, target.hostname);
        self.transport.probe(target).await.map_err(|e| {
            warn!("connection to {} failed: {}", target.hostname, e);
            DeployError::DeviceConnect(e.message().to_string())
        })
    }
}

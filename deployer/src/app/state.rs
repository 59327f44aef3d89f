//! Application state

use std::sync::Arc;

use tracing::info;

use crate::deploy::orchestrator::DeploymentOrchestrator;
use crate::errors::DeployError;
use crate::http::client::{ClientOptions, ManagementClient};
use crate::http::queue::RequestQueue;
use crate::remote::command::DeviceCommandRunner;
use crate::remote::ssh::{SshOptions, SshTransport};
use crate::remote::transport::DeviceTransport;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Components shared by every request of the process. The request queue is
/// created once here and handed to everything issuing certificates.
pub struct AppState {
    pub orchestrator: Arc<DeploymentOrchestrator>,
    pub commands: DeviceCommandRunner,
}

impl AppState {
    /// Build the state with the SSH transport
    pub fn init(settings: &Settings) -> Result<Self, DeployError> {
        let transport = Arc::new(SshTransport::new(SshOptions::from(&settings.device)));
        Self::with_transport(settings, transport)
    }

    /// Build the state over any device transport
    pub fn with_transport(
        settings: &Settings,
        transport: Arc<dyn DeviceTransport>,
    ) -> Result<Self, DeployError> {
        info!("Initializing deployer state...");
        settings.validate()?;

        let layout = StorageLayout::from_settings(&settings.storage);
        let client = Arc::new(ManagementClient::new(ClientOptions::from(&settings.management))?);
        let queue = RequestQueue::new(settings.queue.interval());

        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            client,
            queue,
            Arc::clone(&transport),
            layout.clone(),
        ));
        let commands = DeviceCommandRunner::new(transport, layout);

        Ok(Self {
            orchestrator,
            commands,
        })
    }
}

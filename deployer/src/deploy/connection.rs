//! Thing connection management

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, warn};

use crate::crypto::{aes_encrypt, is_encrypted_for};
use crate::deploy::orchestrator::DeploymentOrchestrator;
use crate::errors::DeployError;
use crate::models::deployment::DeviceCredentials;
use crate::models::thing::ThingConnectionInfo;

impl DeploymentOrchestrator {
    /// Probe the device with the given credentials
    pub async fn test_thing_connection(
        &self,
        thing_id: &str,
        credentials: &DeviceCredentials,
    ) -> Result<(), DeployError> {
        let target = Self::remote_target(thing_id, credentials, "");
        self.connector.test_connection(&target).await?;
        info!("thing {} is reachable at {}", thing_id, credentials.hostname);
        Ok(())
    }

    /// Store the device credentials on the thing, the password encrypted
    /// with the thing key
    pub async fn save_connection_info(
        &self,
        token: &SecretString,
        thing_id: &str,
        credentials: &DeviceCredentials,
    ) -> Result<Value, DeployError> {
        let info = ThingConnectionInfo {
            hostname: credentials.hostname.clone(),
            username: credentials.username.clone(),
            password: encrypted_password(&credentials.password, thing_id),
        };
        self.client
            .update_connection_info(token, thing_id, &info)
            .await
            .map_err(|e| {
                warn!("update connection info of thing {} failed: {}", thing_id, e);
                match e {
                    DeployError::ApiReported { .. } => e,
                    other => DeployError::UpdateConnectionInfo(other.to_string()),
                }
            })
    }
}

fn encrypted_password(password: &SecretString, thing_id: &str) -> String {
    if is_encrypted_for(password, thing_id) {
        password.expose_secret().to_string()
    } else {
        aes_encrypt(password.expose_secret(), thing_id)
    }
}

//! Device connection API client

use secrecy::SecretString;
use serde_json::Value;

use crate::errors::DeployError;
use crate::http::client::ManagementClient;
use crate::models::deployment::Protocol;
use crate::models::thing::ApiEnvelope;

impl ManagementClient {
    /// Connection parameters a device needs for `protocol`. mqtts parameters
    /// live on the certificate, so its id is required for that protocol.
    pub async fn get_connection(
        &self,
        token: &SecretString,
        thing_id: &str,
        protocol: Protocol,
        certificate_id: Option<&str>,
    ) -> Result<Value, DeployError> {
        let url = match protocol {
            Protocol::Mqtts => {
                let certificate_id = certificate_id.ok_or_else(|| {
                    DeployError::InvalidRequest("certificate id is required for mqtts".to_string())
                })?;
                self.api_url(&format!("things/certificates/{}/", certificate_id))
            }
            other => self.api_url(&format!("things/{}/{}connect/", thing_id, other.as_str())),
        };

        let envelope: ApiEnvelope<Value> = self
            .get(&url, token, &format!("get {} connection", protocol))
            .await?;
        Ok(envelope.result)
    }
}

//! Certificate API client

use std::sync::Arc;

use secrecy::SecretString;

use crate::errors::DeployError;
use crate::http::client::ManagementClient;
use crate::http::queue::RequestQueue;
use crate::models::certificate::CertificateDetail;
use crate::models::thing::{ApiEnvelope, CreatedEntity};

/// Upper bound for a single downloaded PEM file
pub const MAX_PEM_BYTES: usize = 64 * 1024;

impl ManagementClient {
    /// Issue a new certificate for a thing
    pub async fn create_certificate(
        &self,
        token: &SecretString,
        thing_id: &str,
    ) -> Result<ApiEnvelope<CreatedEntity>, DeployError> {
        let url = self.api_url(&format!("certificates/create/{}/", thing_id));
        self.get_slow(&url, token, "create cert").await
    }

    /// Issue a new certificate through the paced queue and return its id
    pub async fn create_certificate_queued(
        self: &Arc<Self>,
        queue: &RequestQueue,
        token: &SecretString,
        thing_id: &str,
    ) -> Result<String, DeployError> {
        let client = Arc::clone(self);
        let token = token.clone();
        let thing = thing_id.to_string();

        let outcome = queue
            .submit(move || async move { client.create_certificate(&token, &thing).await })
            .await?;

        let created = outcome.map_err(|e| match e {
            DeployError::ConnectionTimeout(_) => DeployError::ConnectionTimeout(
                "generateQIoTCertificate exception: request connection timeouts".to_string(),
            ),
            DeployError::ConnectionError(msg) => {
                DeployError::Certificate(format!("generateQIoTCertificate exception: {}", msg))
            }
            other => other,
        })?;

        created
            .result
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DeployError::Certificate("certificate id not found in create response".to_string()))
    }

    /// Get the PEM locations of a certificate
    pub async fn get_certificate(
        &self,
        token: &SecretString,
        certificate_id: &str,
    ) -> Result<CertificateDetail, DeployError> {
        let url = self.api_url(&format!("things/certificates/{}/", certificate_id));
        let envelope: ApiEnvelope<CertificateDetail> = self.get(&url, token, "get cert").await?;
        Ok(envelope.result)
    }

    /// Download one PEM file named by a certificate detail location
    pub async fn download_pem(
        &self,
        token: &SecretString,
        location: &str,
        field: &str,
    ) -> Result<String, DeployError> {
        let url = self.file_url(location);
        self.download_text(&url, token, &format!("get {} content", field), MAX_PEM_BYTES)
            .await
    }
}

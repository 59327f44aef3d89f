//! Certificate resolution for a deployment
//!
//! Reuse the newest active, non-revoked certificate of a thing or issue a new
//! one through the paced queue, then download its three PEM files into local
//! staging. The bundle is all or nothing.

use std::sync::Arc;

use regex::Regex;
use secrecy::SecretString;
use tracing::{info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::http::client::ManagementClient;
use crate::http::queue::RequestQueue;
use crate::models::certificate::{CertificateBundle, CertificateDetail, PemKind};

const PEM_FILE_PATTERN: &str = r"[0-9A-Za-z_-]+\.pem";

/// First PEM file name found in a download location
pub fn pem_file_name(location: &str) -> Option<String> {
    Regex::new(PEM_FILE_PATTERN)
        .ok()?
        .find(location)
        .map(|m| m.as_str().to_string())
}

/// Resolves and stages certificates
#[derive(Clone)]
pub struct CertificateProvisioner {
    client: Arc<ManagementClient>,
    queue: RequestQueue,
}

impl CertificateProvisioner {
    pub fn new(client: Arc<ManagementClient>, queue: RequestQueue) -> Self {
        Self { client, queue }
    }

    /// Id of the certificate to deploy
    pub async fn select_certificate(
        &self,
        token: &SecretString,
        thing_id: &str,
        auto_generate: bool,
    ) -> Result<String, DeployError> {
        if auto_generate {
            info!("generating certificate for thing {}", thing_id);
            return self
                .client
                .create_certificate_queued(&self.queue, token, thing_id)
                .await;
        }

        let certificates = self
            .client
            .get_sorted_active_certificates(token, thing_id)
            .await?;
        match certificates.into_iter().next() {
            Some(newest) => {
                info!("reusing certificate {} of thing {}", newest.id, thing_id);
                Ok(newest.id)
            }
            None => {
                info!("no active certificate on thing {}, generating one", thing_id);
                self.client
                    .create_certificate_queued(&self.queue, token, thing_id)
                    .await
            }
        }
    }

    /// Select a certificate and download its PEM files into `staging`
    pub async fn resolve(
        &self,
        token: &SecretString,
        thing_id: &str,
        auto_generate: bool,
        staging: &Dir,
        remote_dir: &str,
    ) -> Result<CertificateBundle, DeployError> {
        let id = self.select_certificate(token, thing_id, auto_generate).await?;
        self.download(token, &id, staging, remote_dir).await
    }

    /// Download the PEM files of certificate `id`, one after the other
    pub async fn download(
        &self,
        token: &SecretString,
        id: &str,
        staging: &Dir,
        remote_dir: &str,
    ) -> Result<CertificateBundle, DeployError> {
        let detail = self.client.get_certificate(token, id).await?;
        let files = pem_locations(&detail)?;

        let mut written: Vec<File> = Vec::with_capacity(files.len());
        for (kind, location, name) in &files {
            let outcome = self
                .download_one(token, *kind, location, &staging.file(name))
                .await;
            match outcome {
                Ok(file) => written.push(file),
                Err(e) => {
                    discard(&written).await;
                    return Err(e);
                }
            }
        }
        info!("downloaded certificate {} into {}", id, staging.path().display());

        let [client, ca, private] = files.map(|(_, _, name)| name);
        Ok(CertificateBundle {
            id: id.to_string(),
            client_cert: client,
            ca_cert: ca,
            private_cert: private,
            staging_dir: staging.path().to_path_buf(),
            remote_dir: remote_dir.to_string(),
        })
    }

    async fn download_one(
        &self,
        token: &SecretString,
        kind: PemKind,
        location: &str,
        file: &File,
    ) -> Result<File, DeployError> {
        let body = self
            .client
            .download_pem(token, location, kind.field())
            .await
            .map_err(|e| match e {
                DeployError::ConnectionTimeout(_) => e,
                DeployError::Download(_) => e,
                other => DeployError::Download(format!("download certificate files failed: {}", other)),
            })?;
        file.write_string(&body).await?;
        Ok(file.clone())
    }
}

/// Check all three locations before anything is downloaded
fn pem_locations(detail: &CertificateDetail) -> Result<[(PemKind, String, String); 3], DeployError> {
    let check = |kind: PemKind| -> Result<(PemKind, String, String), DeployError> {
        let location = kind.location(detail).ok_or_else(|| {
            DeployError::Certificate(format!("{} url not found in response body", kind.field()))
        })?;
        let name = pem_file_name(location).ok_or_else(|| {
            DeployError::Certificate(format!("{} url location should end with pem", kind.field()))
        })?;
        Ok((kind, location.to_string(), name))
    };
    let [client, ca, private] = PemKind::ALL;
    Ok([check(client)?, check(ca)?, check(private)?])
}

async fn discard(files: &[File]) {
    for file in files {
        if let Err(e) = file.delete().await {
            warn!("unable to remove partial certificate {}: {}", file.path().display(), e);
        }
    }
}

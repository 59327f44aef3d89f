//! Resource-only deployment: connection parameters and, for mqtts, the
//! certificate files

use tracing::info;

use crate::deploy::fsm::DeploymentEvent;
use crate::deploy::orchestrator::{DeploymentOrchestrator, Run};
use crate::deploy::workspace::TempWorkspace;
use crate::errors::{DeployError, DeployScope};
use crate::filesys::dir::Dir;
use crate::models::certificate::CertificateBundle;
use crate::models::deployment::{DeployResult, DeploymentRequest};
use crate::remote::fs::RemoteFs;
use crate::remote::transport::{join_remote, RemoteTarget};

const RESOURCE_INFO_FILE: &str = "resourceinfo.json";

impl DeploymentOrchestrator {
    pub(crate) async fn deploy_resources(
        &self,
        run: &mut Run,
        request: &DeploymentRequest,
        resourceinfo_folder: &str,
        cert_folder: Option<&str>,
        auto_generate: bool,
    ) -> Result<DeployResult, DeployError> {
        let cert_folder = match (request.protocol.needs_client_certificate(), cert_folder) {
            (true, Some(folder)) => Some(folder),
            (true, None) => {
                return Err(DeployError::InvalidRequest(
                    "certFolderPath is required for mqtts".to_string(),
                ))
            }
            (false, _) => None,
        };

        let target = Self::remote_target(&request.thing_id, &request.credentials, resourceinfo_folder);
        self.verify_connectivity(run, &target).await?;

        let workspace = TempWorkspace::new(&self.layout.resource_temp_root());
        let outcome = self
            .resource_steps(run, request, &target, &workspace, cert_folder, auto_generate)
            .await;
        workspace.remove().await;
        outcome
    }

    async fn resource_steps(
        &self,
        run: &mut Run,
        request: &DeploymentRequest,
        target: &RemoteTarget,
        workspace: &TempWorkspace,
        cert_folder: Option<&str>,
        auto_generate: bool,
    ) -> Result<DeployResult, DeployError> {
        let paths = workspace.resources(&request.thing_id);
        let resourceinfo_folder = target.destination.clone();

        let mut bundle: Option<CertificateBundle> = None;
        if let Some(folder) = cert_folder {
            run.step(if auto_generate { "generateCert" } else { "getExistingCert" });
            bundle = Some(
                self.certs
                    .resolve(
                        &request.access_token,
                        &request.thing_id,
                        auto_generate,
                        &paths.ssl,
                        folder,
                    )
                    .await?,
            );
        }
        run.advance(DeploymentEvent::Staged)?;

        run.step("getResourceinfo");
        let connection = self
            .client
            .get_connection(
                &request.access_token,
                &request.thing_id,
                request.protocol,
                bundle.as_ref().map(|b| b.id.as_str()),
            )
            .await?;
        paths.res.file(RESOURCE_INFO_FILE).write_json(&connection).await?;
        run.advance(DeploymentEvent::ResourceInfoWritten)?;

        // (local dir, remote folder) pairs, certificates first
        let mut transfers: Vec<(&Dir, &str)> = Vec::with_capacity(2);
        if let Some(folder) = cert_folder {
            transfers.push((&paths.ssl, folder));
        }
        transfers.push((&paths.res, resourceinfo_folder.as_str()));

        run.step("checkCapacity");
        let remote_fs = self.remote_fs(DeployScope::Resource);
        let mut needs = Vec::with_capacity(transfers.len());
        for (dir, folder) in &transfers {
            needs.push((*folder, dir.size_kib().await?));
        }
        remote_fs.check_remote_capacity(target, &needs).await?;
        run.advance(DeploymentEvent::CapacityVerified)?;

        for (dir, folder) in &transfers {
            transfer_dir(run, &remote_fs, target, dir, folder).await?;
        }
        run.advance(DeploymentEvent::Transferred)?;

        let resourceinfo = join_remote(&resourceinfo_folder, RESOURCE_INFO_FILE);
        info!("resourceinfo written to {}:{}", target.hostname, resourceinfo);

        run.advance(DeploymentEvent::Complete)?;
        Ok(DeployResult {
            certificates: bundle.zip(cert_folder).map(|(b, folder)| b.locations(folder)),
            resourceinfo: Some(resourceinfo),
            ..Default::default()
        })
    }
}

async fn transfer_dir(
    run: &mut Run,
    remote_fs: &RemoteFs,
    target: &RemoteTarget,
    dir: &Dir,
    folder: &str,
) -> Result<(), DeployError> {
    run.step("createRemoteDir");
    remote_fs.create_remote_directory(target, folder).await?;
    run.step("syncFiles");
    remote_fs.sync_files(target, dir.path(), folder).await?;
    Ok(())
}

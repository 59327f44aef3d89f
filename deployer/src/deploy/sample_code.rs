//! Sample SDK deployment

use secrecy::SecretString;
use tracing::{info, warn};

use crate::deploy::fsm::DeploymentEvent;
use crate::deploy::orchestrator::{DeploymentOrchestrator, Run};
use crate::deploy::workspace::{SampleCodePaths, TempWorkspace};
use crate::errors::{DeployError, DeployScope};
use crate::filesys::dir::Dir;
use crate::models::deployment::{DeployResult, DeploymentRequest, SampleCodeVariant};
use crate::remote::transport::{join_remote, normalize_remote, RemoteTarget};

const RESOURCE_INFO_FILE: &str = "resourceinfo.json";
const ROOT_CA_NAME: &str = "mycert.pem";

impl DeploymentOrchestrator {
    /// Variant for the thing's declared type; untyped things and unknown
    /// type names get the default variant
    pub async fn infer_sample_code_type(
        &self,
        token: &SecretString,
        thing_id: &str,
    ) -> Result<SampleCodeVariant, DeployError> {
        let type_name = self.client.get_thing_type_name(token, thing_id).await?;
        let variant = SampleCodeVariant::from_thing_type(type_name.as_deref().unwrap_or_default());
        info!("thing type {:?} maps to {}", type_name, variant);
        Ok(variant)
    }

    pub(crate) async fn deploy_sample_code(
        &self,
        run: &mut Run,
        request: &DeploymentRequest,
        folder_path: &str,
        variant: Option<SampleCodeVariant>,
    ) -> Result<DeployResult, DeployError> {
        let target = Self::remote_target(&request.thing_id, &request.credentials, folder_path);
        self.verify_connectivity(run, &target).await?;

        let variant = match variant {
            Some(variant) => variant,
            None => {
                run.step("setSampleCodeType");
                self.infer_sample_code_type(&request.access_token, &request.thing_id)
                    .await?
            }
        };

        let workspace = TempWorkspace::new(self.layout.sample_code_temp_root());
        let outcome = self
            .sample_code_steps(run, request, &target, &workspace, variant)
            .await;
        workspace.remove().await;
        outcome
    }

    async fn sample_code_steps(
        &self,
        run: &mut Run,
        request: &DeploymentRequest,
        target: &RemoteTarget,
        workspace: &TempWorkspace,
        variant: SampleCodeVariant,
    ) -> Result<DeployResult, DeployError> {
        let paths = workspace.sample_code(&request.thing_id, variant);
        let destination = target.destination.clone();
        let remote_ssl = join_remote(&destination, "ssl");

        run.step("getSdk");
        self.stage_sdk(variant, &paths).await?;

        if request.protocol.needs_root_ca() {
            run.step("generateHTTPSCertificate");
            self.stage_root_ca(&paths.ssl).await;
        }

        let mut bundle = None;
        if request.protocol.needs_client_certificate() {
            run.step("generateMQTTSCertificate");
            bundle = Some(
                self.certs
                    .resolve(
                        &request.access_token,
                        &request.thing_id,
                        false,
                        &paths.ssl,
                        &remote_ssl,
                    )
                    .await?,
            );
        }
        run.advance(DeploymentEvent::Staged)?;

        run.step("getConnection");
        let connection = self
            .client
            .get_connection(
                &request.access_token,
                &request.thing_id,
                request.protocol,
                bundle.as_ref().map(|b| b.id.as_str()),
            )
            .await?;
        run.step("writeResourceinfo");
        paths.res.file(RESOURCE_INFO_FILE).write_json(&connection).await?;
        run.advance(DeploymentEvent::ResourceInfoWritten)?;

        run.step("mesureNeedMemory");
        let required = paths.examples.size_kib().await?;
        let remote_fs = self.remote_fs(DeployScope::Code);
        remote_fs
            .measure_remote_available_space(target, &destination, required)
            .await?;
        run.advance(DeploymentEvent::CapacityVerified)?;

        run.step("sshToDevice");
        remote_fs.create_remote_directory(target, &destination).await?;
        run.step("scpExample");
        let codepath = remote_fs
            .sync_files(target, paths.examples.path(), &destination)
            .await?;
        run.advance(DeploymentEvent::Transferred)?;

        run.advance(DeploymentEvent::Complete)?;
        Ok(DeployResult {
            codepath: Some(normalize_remote(&codepath)),
            certificates: bundle.map(|b| b.locations(&remote_ssl)),
            ..Default::default()
        })
    }

    /// Copy the variant's part of the SDK tree into the workspace
    async fn stage_sdk(&self, variant: SampleCodeVariant, paths: &SampleCodePaths) -> Result<(), DeployError> {
        let source = Dir::new(self.layout.sdk_source_dir().path().join(variant.device_path()));
        if !source.exists().await {
            return Err(DeployError::DeviceDeployCode(format!(
                "get sdk fail: {} not found",
                source.path().display()
            )));
        }
        let staged = Dir::new(paths.sdk_root.path().join(variant.device_path()));
        source.copy_to(&staged).await?;
        paths.ssl.create().await?;
        paths.res.create().await
    }

    /// https code ships the management root CA when one is installed
    async fn stage_root_ca(&self, ssl: &Dir) {
        let root_ca = self.layout.root_ca_file();
        if !root_ca.exists().await {
            warn!("Root ca-cert file not found: {}", root_ca.path().display());
            return;
        }
        if let Err(e) = root_ca.copy_to(&ssl.file(ROOT_CA_NAME)).await {
            warn!("unable to stage root ca-cert: {}", e);
        }
    }
}

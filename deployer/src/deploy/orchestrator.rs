//! Deployment orchestrator
//!
//! Drives one deployment run through its fixed step sequence. Every run gets
//! its own FSM, step log and workspace; the workspace is removed before the
//! call returns on every path. Nothing is retried and no remote rollback is
//! attempted, so files already copied to a device stay there on failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info, info_span, Instrument};

use crate::crypto::decrypt_or_plaintext;
use crate::deploy::certs::CertificateProvisioner;
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentPlan, DeploymentState};
use crate::deploy::steplog::StepLog;
use crate::errors::{DeployError, DeployScope};
use crate::http::client::ManagementClient;
use crate::http::queue::RequestQueue;
use crate::models::deployment::{DeployResult, DeploymentKind, DeploymentRequest, DeviceCredentials};
use crate::remote::connector::DeviceConnector;
use crate::remote::fs::RemoteFs;
use crate::remote::transport::{DeviceTransport, RemoteTarget};
use crate::storage::layout::StorageLayout;
use crate::utils::generate_uuid;

/// State of one run threaded through the per-kind steps
pub struct Run {
    fsm: DeploymentFsm,
    steps: StepLog,
}

impl Run {
    fn new(number: u64, plan: DeploymentPlan) -> Self {
        Self {
            fsm: DeploymentFsm::new(plan),
            steps: StepLog::new(number),
        }
    }

    /// Mark the start of a named step
    pub fn step(&mut self, name: &'static str) {
        self.steps.record(name);
    }

    pub fn advance(&mut self, event: DeploymentEvent) -> Result<(), DeployError> {
        self.fsm
            .process(event)
            .map(|_| ())
            .map_err(DeployError::Internal)
    }

    pub fn state(&self) -> DeploymentState {
        self.fsm.state()
    }

    fn fail(&mut self, err: &DeployError) {
        if let Err(e) = self.fsm.process(DeploymentEvent::Fail(err.to_string())) {
            error!("{}", e);
        }
    }
}

/// Entry point for deployments
pub struct DeploymentOrchestrator {
    pub(crate) client: Arc<ManagementClient>,
    pub(crate) certs: CertificateProvisioner,
    pub(crate) connector: DeviceConnector,
    pub(crate) transport: Arc<dyn DeviceTransport>,
    pub(crate) layout: StorageLayout,
    runs: AtomicU64,
}

impl DeploymentOrchestrator {
    pub fn new(
        client: Arc<ManagementClient>,
        queue: RequestQueue,
        transport: Arc<dyn DeviceTransport>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            certs: CertificateProvisioner::new(Arc::clone(&client), queue),
            connector: DeviceConnector::new(Arc::clone(&transport)),
            client,
            transport,
            layout,
            runs: AtomicU64::new(0),
        }
    }

    /// Number of runs started since the process began
    pub fn runs_started(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Run one deployment to completion or failure
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<DeployResult, DeployError> {
        let number = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let run_id = generate_uuid();
        let span = info_span!(
            "deploy",
            run = number,
            run_id = %run_id,
            thing_id = %request.thing_id,
            kind = request.kind.name(),
        );
        self.run(number, request).instrument(span).await
    }

    async fn run(&self, number: u64, request: &DeploymentRequest) -> Result<DeployResult, DeployError> {
        info!(
            "deploy {} to {}@{} over {}",
            request.kind.name(),
            request.credentials.username,
            request.credentials.hostname,
            request.protocol
        );
        let mut run = Run::new(number, DeploymentPlan::for_kind(&request.kind));

        let outcome = self.dispatch(&mut run, request).await;
        match &outcome {
            Ok(result) => {
                info!("deploy has succeeded: {:?}", result);
            }
            Err(e) => {
                error!(step = run.steps.current().unwrap_or("start"), "deploy failed: {}", e);
                run.fail(e);
            }
        }
        run.steps.finish(run.state());
        outcome
    }

    async fn dispatch(&self, run: &mut Run, request: &DeploymentRequest) -> Result<DeployResult, DeployError> {
        match &request.kind {
            DeploymentKind::SampleCode {
                folder_path,
                sample_code_type,
            } => {
                self.deploy_sample_code(run, request, folder_path, Some(*sample_code_type))
                    .await
            }
            DeploymentKind::InferredSampleCode { folder_path } => {
                self.deploy_sample_code(run, request, folder_path, None).await
            }
            DeploymentKind::UserFunction {
                function_id,
                function_name,
                folder_path,
                code,
                cached_code_path,
            } => {
                self.deploy_user_function(
                    run,
                    request,
                    function_id,
                    function_name,
                    folder_path,
                    code.as_ref(),
                    cached_code_path.as_deref(),
                )
                .await
            }
            DeploymentKind::Resources {
                resourceinfo_folder_path,
                cert_folder_path,
                auto_generate_cert,
            } => {
                self.deploy_resources(
                    run,
                    request,
                    resourceinfo_folder_path,
                    cert_folder_path.as_deref(),
                    *auto_generate_cert,
                )
                .await
            }
        }
    }

    /// Device target with the password decrypted by the thing key when it
    /// arrived encrypted
    pub fn remote_target(thing_id: &str, credentials: &DeviceCredentials, destination: &str) -> RemoteTarget {
        RemoteTarget::new(
            credentials.hostname.clone(),
            credentials.username.clone(),
            decrypt_or_plaintext(&credentials.password, thing_id),
            destination,
        )
    }

    pub(crate) fn remote_fs(&self, scope: DeployScope) -> RemoteFs {
        RemoteFs::new(Arc::clone(&self.transport), scope)
    }

    /// `Idle -> ConnectivityVerified`
    pub(crate) async fn verify_connectivity(&self, run: &mut Run, target: &RemoteTarget) -> Result<(), DeployError> {
        run.step("testConnection");
        self.connector.test_connection(target).await?;
        run.advance(DeploymentEvent::ConnectivityVerified)
    }
}

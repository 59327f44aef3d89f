//! User function deployment
//!
//! A new upload is extracted into a workspace under the function's cache
//! directory, copied to the device, then moved into the cache next to its
//! archive. A re-deploy copies the cached code as is.

use std::path::PathBuf;

use regex::Regex;
use tracing::info;

use crate::archive::unzip_bytes;
use crate::deploy::fsm::DeploymentEvent;
use crate::deploy::orchestrator::{DeploymentOrchestrator, Run};
use crate::deploy::workspace::TempWorkspace;
use crate::errors::{DeployError, DeployScope};
use crate::filesys::dir::Dir;
use crate::models::deployment::{CodeArchive, DeployResult, DeploymentRequest};
use crate::remote::transport::{join_remote, RemoteTarget};

const FUNCTION_ID_PATTERN: &str = r"^[a-zA-Z0-9_-]{1,64}$";
const CACHED_CODE_PATTERN: &str = r"/code/*$";

pub fn is_valid_function_id(function_id: &str) -> bool {
    Regex::new(FUNCTION_ID_PATTERN)
        .map(|re| re.is_match(function_id))
        .unwrap_or(false)
}

pub fn is_cached_code_path(path: &str) -> bool {
    Regex::new(CACHED_CODE_PATTERN)
        .map(|re| re.is_match(path))
        .unwrap_or(false)
}

/// Public download path of an uploaded archive
pub fn download_url(thing_id: &str, function_id: &str) -> String {
    format!("/v1/deploy/media/{}/{}/code.zip", thing_id, function_id)
}

/// Function identity shared by both deploy paths
struct FunctionRef<'a> {
    thing_id: &'a str,
    function_id: &'a str,
}

impl DeploymentOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn deploy_user_function(
        &self,
        run: &mut Run,
        request: &DeploymentRequest,
        function_id: &str,
        function_name: &str,
        folder_path: &str,
        code: Option<&CodeArchive>,
        cached_code_path: Option<&str>,
    ) -> Result<DeployResult, DeployError> {
        if !is_valid_function_id(function_id) {
            return Err(DeployError::InvalidRequest(format!(
                "functionId {:?} must match {}",
                function_id, FUNCTION_ID_PATTERN
            )));
        }
        let function = FunctionRef {
            thing_id: &request.thing_id,
            function_id,
        };

        // a re-deploy must point at existing cached code before the device is touched
        let cached = match code {
            Some(_) => None,
            None => Some(self.locate_cached_code(&function, cached_code_path).await?),
        };

        let destination = join_remote(folder_path, function_name);
        let target = Self::remote_target(&request.thing_id, &request.credentials, &destination);
        self.verify_connectivity(run, &target).await?;

        let (codepath, cache) = match (code, cached) {
            (Some(archive), _) => (
                self.deploy_upload(run, &function, &target, archive).await?,
                self.layout
                    .function_code_dir(function.thing_id, function.function_id),
            ),
            (None, Some(cached)) => (self.deploy_cached(run, &target, &cached).await?, cached),
            (None, None) => {
                return Err(DeployError::Internal("no code to deploy".to_string()));
            }
        };

        run.advance(DeploymentEvent::Complete)?;
        Ok(DeployResult {
            codepath: Some(codepath),
            cached_code_path: Some(cache.path().display().to_string()),
            download_url: Some(download_url(function.thing_id, function.function_id)),
            ..Default::default()
        })
    }

    async fn locate_cached_code(
        &self,
        function: &FunctionRef<'_>,
        cached_code_path: Option<&str>,
    ) -> Result<Dir, DeployError> {
        let path = match cached_code_path.filter(|p| !p.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => self
                .layout
                .function_code_dir(function.thing_id, function.function_id)
                .path()
                .to_path_buf(),
        };
        let shown = path.display().to_string();
        if !is_cached_code_path(&shown) {
            return Err(DeployError::FunctionNotFound(shown));
        }
        let dir = Dir::new(path);
        if !dir.exists().await {
            return Err(DeployError::FunctionNotFound(shown));
        }
        Ok(dir)
    }

    async fn deploy_upload(
        &self,
        run: &mut Run,
        function: &FunctionRef<'_>,
        target: &RemoteTarget,
        archive: &CodeArchive,
    ) -> Result<String, DeployError> {
        let function_dir = self.layout.function_dir(function.thing_id, function.function_id);
        let workspace = TempWorkspace::new(function_dir.path());
        let outcome = self.upload_steps(run, function, target, &workspace, archive).await;
        workspace.remove().await;
        outcome
    }

    async fn upload_steps(
        &self,
        run: &mut Run,
        function: &FunctionRef<'_>,
        target: &RemoteTarget,
        workspace: &TempWorkspace,
        archive: &CodeArchive,
    ) -> Result<String, DeployError> {
        let code = workspace.code();

        run.step("unzip");
        let entries = unzip_bytes(archive.as_bytes().to_vec(), code.path().to_path_buf()).await?;
        info!("unzipped {} entries to {}", entries, code.path().display());
        run.advance(DeploymentEvent::Staged)?;

        let codepath = self.transfer_code(run, target, &code).await?;

        run.step("cacheCode");
        self.layout
            .function_archive(function.thing_id, function.function_id)
            .write_bytes(archive.as_bytes())
            .await?;
        code.move_to(&self.layout.function_code_dir(function.thing_id, function.function_id))
            .await?;
        Ok(codepath)
    }

    async fn deploy_cached(
        &self,
        run: &mut Run,
        target: &RemoteTarget,
        cached: &Dir,
    ) -> Result<String, DeployError> {
        info!("re-deploy cached code {}", cached.path().display());
        run.advance(DeploymentEvent::Staged)?;
        self.transfer_code(run, target, cached).await
    }

    /// Capacity check, then `mkdir` and copy into the run destination
    async fn transfer_code(
        &self,
        run: &mut Run,
        target: &RemoteTarget,
        code: &Dir,
    ) -> Result<String, DeployError> {
        let remote_fs = self.remote_fs(DeployScope::Code);

        run.step("checkCapacity");
        let required = code.size_kib().await?;
        remote_fs
            .measure_remote_available_space(target, &target.destination, required)
            .await?;
        run.advance(DeploymentEvent::CapacityVerified)?;

        run.step("createRemoteDir");
        remote_fs
            .create_remote_directory(target, &target.destination)
            .await?;
        run.step("syncFiles");
        let codepath = remote_fs
            .sync_files(target, code.path(), &target.destination)
            .await?;
        run.advance(DeploymentEvent::Transferred)?;
        Ok(codepath)
    }
}

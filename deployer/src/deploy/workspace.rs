//! Per-run local staging directory
//!
//! Every run stages under `{parent}/{uuid}`, so concurrent runs never share
//! local files even for the same thing. The tree is removed when the run
//! ends, whatever the outcome.

use std::path::Path;

use tracing::{debug, error};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::deployment::SampleCodeVariant;
use crate::storage::layout::SDK_DIR_NAME;
use crate::utils::generate_uuid;

/// Staged sample SDK paths
#[derive(Debug, Clone)]
pub struct SampleCodePaths {
    /// Copy of the whole SDK tree
    pub sdk_root: Dir,
    /// `examples` directory of the chosen variant, the transferred payload
    pub examples: Dir,
    pub ssl: Dir,
    pub res: Dir,
}

/// Staged resource-only paths
#[derive(Debug, Clone)]
pub struct ResourcePaths {
    pub ssl: Dir,
    pub res: Dir,
}

/// UUID-named staging tree owned by one run
#[derive(Debug)]
pub struct TempWorkspace {
    root: Dir,
    removed: bool,
}

impl TempWorkspace {
    /// Reserve a fresh workspace below `parent`. Nothing is created yet.
    pub fn new(parent: &Path) -> Self {
        Self {
            root: Dir::new(parent.join(generate_uuid())),
            removed: false,
        }
    }

    pub fn root(&self) -> &Dir {
        &self.root
    }

    pub async fn create(&self) -> Result<(), DeployError> {
        self.root.create().await
    }

    fn staging(&self, thing_id: &str) -> Dir {
        self.root.subdir(thing_id)
    }

    /// `{root}/{thing}/qnap-qiot-sdks/{device path}/examples` with its
    /// `ssl` and `res` subdirectories
    pub fn sample_code(&self, thing_id: &str, variant: SampleCodeVariant) -> SampleCodePaths {
        let sdk_root = self.staging(thing_id).subdir(SDK_DIR_NAME);
        let examples = Dir::new(sdk_root.path().join(variant.device_path()).join("examples"));
        SampleCodePaths {
            ssl: examples.subdir("ssl"),
            res: examples.subdir("res"),
            sdk_root,
            examples,
        }
    }

    pub fn resources(&self, thing_id: &str) -> ResourcePaths {
        let staging = self.staging(thing_id);
        ResourcePaths {
            ssl: staging.subdir("ssl"),
            res: staging.subdir("res"),
        }
    }

    /// Extracted user function code
    pub fn code(&self) -> Dir {
        self.root.subdir("code")
    }

    /// Remove the whole tree. Failures are logged, never returned.
    pub async fn remove(mut self) {
        self.removed = true;
        match self.root.delete().await {
            Ok(()) => debug!("removed workspace {}", self.root.path().display()),
            Err(e) => error!("removeDir err: {}", e),
        }
    }
}

impl Drop for TempWorkspace {
    // runs whose future was dropped mid-flight still leave nothing behind
    fn drop(&mut self) {
        if !self.removed && self.root.path().exists() {
            if let Err(e) = std::fs::remove_dir_all(self.root.path()) {
                error!("removeDir err: {}: {}", self.root.path().display(), e);
            }
        }
    }
}

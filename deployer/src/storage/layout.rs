//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::storage::settings::StorageSettings;

/// Directory name of the sample SDK tree
pub const SDK_DIR_NAME: &str = "qnap-qiot-sdks";

/// Local paths used by the deployer
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,

    /// Root of the user function cache
    pub function_root: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>, function_root: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            function_root: function_root.into(),
        }
    }

    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(settings.base_dir.clone(), settings.function_root.clone())
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Pristine sample SDK tree copied into every sample-code workspace
    pub fn sdk_source_dir(&self) -> Dir {
        Dir::new(self.base_dir.join(SDK_DIR_NAME))
    }

    /// Parent of the per-run sample-code workspaces
    pub fn sample_code_temp_root(&self) -> &Path {
        &self.base_dir
    }

    /// Parent of the per-run resource workspaces
    pub fn resource_temp_root(&self) -> PathBuf {
        self.base_dir.join("tempResource")
    }

    /// Root CA handed to https sample code
    pub fn root_ca_file(&self) -> File {
        File::new(self.base_dir.join("ssl").join("certs").join("myrootca.crt"))
    }

    /// Holds `commandAgent.sh` and transient command scripts
    pub fn command_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("command"))
    }

    /// Cache directory of one user function
    pub fn function_dir(&self, thing_id: &str, function_id: &str) -> Dir {
        Dir::new(self.function_root.join(thing_id).join(function_id))
    }

    /// Cached, extracted code of one user function
    pub fn function_code_dir(&self, thing_id: &str, function_id: &str) -> Dir {
        self.function_dir(thing_id, function_id).subdir("code")
    }

    /// Uploaded archive of one user function
    pub fn function_archive(&self, thing_id: &str, function_id: &str) -> File {
        self.function_dir(thing_id, function_id).file("code.zip")
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::from_settings(&StorageSettings::default())
    }
}

//! Command-line options

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::DeployError;

/// What one invocation does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a deployment described by a request file
    Deploy(PathBuf),

    /// Probe a device only
    Connect(PathBuf),

    /// Store device credentials on the thing
    SaveConnection(PathBuf),

    /// Launch a script on a device
    Exec(PathBuf),

    /// Read a launched script's log
    CommandLog(PathBuf),

    /// List sample code variants and the default for a type query
    SampleCodeTypes(String),
}

/// Options parsed from `--key=value` arguments
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Settings file, defaults apply when absent
    pub settings_file: Option<PathBuf>,

    pub action: Action,
}

impl AppOptions {
    pub fn from_args(args: &HashMap<String, String>) -> Result<Self, DeployError> {
        let path = |key: &str| args.get(key).map(PathBuf::from);

        let action = if let Some(file) = path("deploy") {
            Action::Deploy(file)
        } else if let Some(file) = path("connect") {
            Action::Connect(file)
        } else if let Some(file) = path("save-connection") {
            Action::SaveConnection(file)
        } else if let Some(file) = path("exec") {
            Action::Exec(file)
        } else if let Some(file) = path("command-log") {
            Action::CommandLog(file)
        } else if let Some(query) = args.get("sample-code-types") {
            Action::SampleCodeTypes(query.clone())
        } else {
            return Err(DeployError::InvalidRequest(
                "one of --deploy, --connect, --save-connection, --exec, --command-log or --sample-code-types is required"
                    .to_string(),
            ));
        };

        Ok(Self {
            settings_file: path("settings"),
            action,
        })
    }
}

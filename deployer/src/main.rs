//! QIoT Deployer - Entry Point
//!
//! Runs one deployment, connectivity check or command action described by a
//! JSON request file and prints the result object or the error envelope.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use qiot_deployer::app::options::AppOptions;
use qiot_deployer::app::run::run;
use qiot_deployer::app::state::AppState;
use qiot_deployer::errors::DeployError;
use qiot_deployer::filesys::file::File;
use qiot_deployer::logs::{init_logging, LogOptions};
use qiot_deployer::storage::settings::Settings;
use qiot_deployer::utils::version_info;

use serde_json::Value;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    if cli_args.contains_key("version") {
        let version = version_info();
        return print_json(&serde_json::to_value(&version).unwrap_or(Value::Null));
    }

    match execute(&cli_args).await {
        Ok(result) => print_json(&result),
        Err(e) => {
            error!("{}", e);
            print_json(&e.to_body());
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli_args: &HashMap<String, String>) -> Result<Value, DeployError> {
    let options = AppOptions::from_args(cli_args)?;

    let mut settings = match &options.settings_file {
        Some(path) => Settings::load(&File::new(path)).await?,
        None => Settings::default(),
    };
    settings.apply_env_overrides();

    let log_options = LogOptions {
        log_level: settings.log_level,
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
        console: true,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let state = AppState::init(&settings)?;
    run(&state, &options.action).await
}

fn print_json(value: &Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render result: {e}");
            ExitCode::FAILURE
        }
    }
}

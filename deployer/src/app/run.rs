//! Runs one command-line action

use std::path::Path;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::app::options::Action;
use crate::app::state::AppState;
use crate::deploy::orchestrator::DeploymentOrchestrator;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::command::{CommandLogRequest, CommandRequest};
use crate::models::deployment::{DeploymentRequest, SampleCodeCatalog, ThingConnectionRequest};

/// Run `action` and return its result object
pub async fn run(state: &AppState, action: &Action) -> Result<Value, DeployError> {
    match action {
        Action::Deploy(path) => {
            let request: DeploymentRequest = read_request(path).await?;
            let result = state.orchestrator.deploy(&request).await?;
            to_value(&result)
        }
        Action::Connect(path) => {
            let request: ThingConnectionRequest = read_request(path).await?;
            state
                .orchestrator
                .test_thing_connection(&request.thing_id, &request.credentials)
                .await?;
            Ok(json!({ "thingId": request.thing_id, "connected": true }))
        }
        Action::SaveConnection(path) => {
            let request: ThingConnectionRequest = read_request(path).await?;
            let token = access_token(&request)?;
            state
                .orchestrator
                .save_connection_info(token, &request.thing_id, &request.credentials)
                .await
        }
        Action::Exec(path) => {
            let request: CommandRequest = read_request(path).await?;
            let target = DeploymentOrchestrator::remote_target(&request.thing_id, &request.credentials, "");
            let uid = state
                .commands
                .execute_command(&target, &request.thing_id, &request.script, request.capture())
                .await?;
            info!("command {} started on thing {}", uid, request.thing_id);
            Ok(json!({ "uid": uid }))
        }
        Action::CommandLog(path) => {
            let request: CommandLogRequest = read_request(path).await?;
            let target = DeploymentOrchestrator::remote_target(&request.thing_id, &request.credentials, "");
            let log = state
                .commands
                .read_command_log(&target, &request.thing_id, &request.uid, request.stream)
                .await?;
            Ok(json!({ "log": log }))
        }
        Action::SampleCodeTypes(query) => to_value(&SampleCodeCatalog::for_query(query)),
    }
}

async fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T, DeployError> {
    File::new(path)
        .read_json::<T>()
        .await
        .map_err(|e| DeployError::InvalidRequest(e.to_string()))
}

fn access_token(request: &ThingConnectionRequest) -> Result<&SecretString, DeployError> {
    request
        .access_token
        .as_ref()
        .ok_or_else(|| DeployError::InvalidRequest("accessToken is required".to_string()))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, DeployError> {
    serde_json::to_value(value).map_err(|e| DeployError::Internal(e.to_string()))
}

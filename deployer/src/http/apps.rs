//! Application API client

use secrecy::SecretString;
use serde_json::{json, Value};

use crate::errors::DeployError;
use crate::http::client::ManagementClient;

impl ManagementClient {
    pub async fn create_app(&self, token: &SecretString, name: &str) -> Result<Value, DeployError> {
        let body = json!({
            "appname": name,
            "description": "",
            "rulesdata": {
                "ruleName": name,
                "freeboardName": name,
            },
        });
        self.post(&self.api_url("iotapp/"), Some(token), "create application", &body)
            .await
    }

    pub async fn remove_app(&self, token: &SecretString, app_id: &str) -> Result<Value, DeployError> {
        self.delete(
            &self.api_url("iotapp/multidelete/"),
            token,
            "remove application",
            &json!([app_id]),
        )
        .await
    }
}

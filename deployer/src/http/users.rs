//! User API client

use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::errors::DeployError;
use crate::http::client::ManagementClient;

impl ManagementClient {
    /// Log in with user credentials; the response carries the access token
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<Value, DeployError> {
        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });
        self.post(&self.api_url("users/login/"), None, "login", &body)
            .await
    }
}

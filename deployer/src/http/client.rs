//! Management API client
//!
//! Every call issues exactly one HTTP request and resolves to a parsed JSON
//! body or one classified [`DeployError`]: connection timeout, transport
//! error, HTTP status >= 400, or an error the API reported in `body.error[0]`.
//! Nothing is retried here.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::DeployError;
use crate::storage::settings::ManagementSettings;

const ACCESS_TOKEN_HEADER: &str = "Access-Token";

/// Code used when the API reports an error without one
const UNKNOWN_API_ERROR_CODE: i64 = 7002;

/// Client options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Endpoint prefix, without trailing slash
    pub endpoint: String,
    pub api_version: String,
    /// Ceiling for ordinary calls
    pub request_timeout: Duration,
    /// Ceiling for certificate issuance and downloads
    pub certificate_timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl From<&ManagementSettings> for ClientOptions {
    fn from(settings: &ManagementSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_version: settings.api_version.clone(),
            request_timeout: settings.request_timeout(),
            certificate_timeout: settings.certificate_timeout(),
            accept_invalid_certs: settings.accept_invalid_certs,
        }
    }
}

/// HTTP client for the management API
#[derive(Debug, Clone)]
pub struct ManagementClient {
    client: Client,
    endpoint: String,
    api_version: String,
    request_timeout: Duration,
    certificate_timeout: Duration,
}

impl ManagementClient {
    /// Create a new management client
    pub fn new(options: ClientOptions) -> Result<Self, DeployError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| DeployError::Config(format!("unable to build http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
            api_version: options.api_version,
            request_timeout: options.request_timeout,
            certificate_timeout: options.certificate_timeout,
        })
    }

    /// Get the endpoint prefix
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn certificate_timeout(&self) -> Duration {
        self.certificate_timeout
    }

    /// Versioned API url for `path`
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.api_version,
            path.trim_start_matches('/')
        )
    }

    /// Url of a file served by the endpoint, e.g. a PEM location
    pub fn file_url(&self, location: &str) -> String {
        format!("{}{}", self.endpoint, location)
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        token: Option<&SecretString>,
        timeout: Duration,
    ) -> RequestBuilder {
        let mut request = self.client.request(method, url).timeout(timeout);
        if let Some(token) = token {
            request = request.header(ACCESS_TOKEN_HEADER, token.expose_secret());
        }
        request
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &SecretString,
        action: &str,
    ) -> Result<T, DeployError> {
        debug!("GET {}", url);
        let request = self.request(Method::GET, url, Some(token), self.request_timeout);
        let body = self.execute(request, action).await?;
        decode(body, action)
    }

    /// Make a GET request with the certificate ceiling
    pub async fn get_slow<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &SecretString,
        action: &str,
    ) -> Result<T, DeployError> {
        debug!("GET {} (slow)", url);
        let request = self.request(Method::GET, url, Some(token), self.certificate_timeout);
        let body = self.execute(request, action).await?;
        decode(body, action)
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        token: Option<&SecretString>,
        action: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        debug!("POST {}", url);
        let request = self
            .request(Method::POST, url, token, self.request_timeout)
            .json(body);
        let body = self.execute(request, action).await?;
        decode(body, action)
    }

    /// Make a PATCH request
    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        token: &SecretString,
        action: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        debug!("PATCH {}", url);
        let request = self
            .request(Method::PATCH, url, Some(token), self.request_timeout)
            .json(body);
        let body = self.execute(request, action).await?;
        decode(body, action)
    }

    /// Make a DELETE request with a JSON body
    pub async fn delete<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        token: &SecretString,
        action: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        debug!("DELETE {}", url);
        let request = self
            .request(Method::DELETE, url, Some(token), self.request_timeout)
            .json(body);
        let body = self.execute(request, action).await?;
        decode(body, action)
    }

    /// Download a file as text, refusing bodies over `max_bytes`
    pub async fn download_text(
        &self,
        url: &str,
        token: &SecretString,
        action: &str,
        max_bytes: usize,
    ) -> Result<String, DeployError> {
        debug!("GET {} (download)", url);
        let request = self.request(Method::GET, url, Some(token), self.certificate_timeout);
        let mut response = request
            .send()
            .await
            .map_err(|e| classify_transport(action, e))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let text = response
                .text()
                .await
                .map_err(|e| classify_transport(action, e))?;
            error!("{} failed: {} - {}", action, status, text);
            return Err(DeployError::ApiStatus {
                status: status.as_u16(),
                message: format!("{} failed: {}", action, text),
            });
        }

        let too_large = |size: u64| {
            DeployError::Download(format!(
                "{} failed: body of {} bytes exceeds {} bytes",
                action, size, max_bytes
            ))
        };
        if let Some(length) = response.content_length().filter(|l| *l > max_bytes as u64) {
            return Err(too_large(length));
        }

        // stop reading as soon as the cap is passed
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify_transport(action, e))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > max_bytes {
                return Err(too_large(body.len() as u64));
            }
        }
        String::from_utf8(body)
            .map_err(|e| DeployError::Download(format!("{} failed: {}", action, e)))
    }

    /// Send a request and classify the outcome
    async fn execute(&self, request: RequestBuilder, action: &str) -> Result<Value, DeployError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(action, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(action, e))?;

        if status.as_u16() >= 400 {
            error!("{} failed: {} - {}", action, status, text);
            return Err(DeployError::ApiStatus {
                status: status.as_u16(),
                message: format!("{} failed: {}", action, text),
            });
        }

        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| DeployError::ConnectionError(format!("{} failed: {}", action, e)))?
        };

        if let Some(err) = reported_error(&body) {
            error!("{} failed: {}", action, err);
            return Err(err);
        }
        Ok(body)
    }
}

fn classify_transport(action: &str, err: reqwest::Error) -> DeployError {
    if err.is_timeout() {
        DeployError::ConnectionTimeout(format!("{} failed: connection timeout", action))
    } else {
        DeployError::ConnectionError(format!("{} failed: {}", action, err))
    }
}

/// Extract `body.error[0]` when the API reports a failure with a 2xx status
fn reported_error(body: &Value) -> Option<DeployError> {
    let first = body.get("error")?.get(0)?;
    let message = first
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let code = match first.get("code") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .unwrap_or(UNKNOWN_API_ERROR_CODE);
    Some(DeployError::ApiReported { code, message })
}

fn decode<T: DeserializeOwned>(body: Value, action: &str) -> Result<T, DeployError> {
    serde_json::from_value(body)
        .map_err(|e| DeployError::ConnectionError(format!("{} failed: unexpected body: {}", action, e)))
}

//! Thing API client

use secrecy::SecretString;
use serde_json::{json, Value};

use crate::errors::DeployError;
use crate::http::client::ManagementClient;
use crate::models::certificate::CertificateSummary;
use crate::models::thing::{
    ApiEnvelope, SupportedThingType, ThingConnectionInfo, ThingDetail, ThingTypeDetail,
    DEFAULT_RESOURCE_TYPE_ID,
};

impl ManagementClient {
    /// Register a thing of one of the supported types
    pub async fn create_thing(
        &self,
        token: &SecretString,
        app_id: &str,
        name: &str,
        thing_type: &str,
    ) -> Result<Value, DeployError> {
        let body = json!({
            "description": "",
            "thingname": name,
            "thingtypeattributes": {
                "attributes": {},
                "thingtypeid": SupportedThingType::from_name(thing_type).type_id(),
            },
            "thingattributes": {},
            "type": "QIoTSupported",
            "iotappid": app_id,
        });
        self.post(&self.api_url("things/"), Some(token), "create thing", &body)
            .await
    }

    /// Register a custom thing without a type
    pub async fn create_thing_without_type(
        &self,
        token: &SecretString,
        app_id: &str,
        name: &str,
    ) -> Result<Value, DeployError> {
        let body = json!({
            "description": "",
            "thingname": name,
            "thingtypeattributes": {
                "attributes": {},
                "thingtypeid": "",
            },
            "thingattributes": {},
            "type": "Custom",
            "iotappid": app_id,
        });
        self.post(&self.api_url("things/"), Some(token), "create thing", &body)
            .await
    }

    /// Add a float resource to a thing
    pub async fn create_thing_resource(
        &self,
        token: &SecretString,
        thing_id: &str,
        name: &str,
    ) -> Result<Value, DeployError> {
        let body = json!({
            "description": "",
            "resourcetype": DEFAULT_RESOURCE_TYPE_ID,
            "datatype": "Float",
            "minvalue": "",
            "maxvalue": "",
            "default_value": "",
            "unit": "°C",
            "resourcename": name,
            "resourceid": name,
        });
        let url = self.api_url(&format!("things/resources/{}/", thing_id));
        self.post(&url, Some(token), "create thing resource", &body)
            .await
    }

    pub async fn remove_thing(&self, token: &SecretString, thing_id: &str) -> Result<Value, DeployError> {
        self.delete(
            &self.api_url("things/multidelete/"),
            token,
            "remove thing",
            &json!([thing_id]),
        )
        .await
    }

    pub async fn get_thing_detail(
        &self,
        token: &SecretString,
        thing_id: &str,
    ) -> Result<ThingDetail, DeployError> {
        let url = self.api_url(&format!("things/{}/", thing_id));
        let envelope: ApiEnvelope<ThingDetail> = self.get(&url, token, "get thing detail").await?;
        Ok(envelope.result)
    }

    pub async fn get_thing_type_detail(
        &self,
        token: &SecretString,
        thing_type_id: &str,
    ) -> Result<ThingTypeDetail, DeployError> {
        let url = self.api_url(&format!("thingstype/{}/", thing_type_id));
        let envelope: ApiEnvelope<ThingTypeDetail> =
            self.get(&url, token, "get thingType detail").await?;
        Ok(envelope.result)
    }

    /// Declared type name of a thing, `None` when it has no type
    pub async fn get_thing_type_name(
        &self,
        token: &SecretString,
        thing_id: &str,
    ) -> Result<Option<String>, DeployError> {
        let detail = self.get_thing_detail(token, thing_id).await?;
        let Some(type_id) = detail.thingtypeattributes.and_then(|attrs| attrs.thingtype) else {
            return Ok(None);
        };

        let type_detail = self.get_thing_type_detail(token, &type_id).await?;
        type_detail.thingtypename.map(Some).ok_or_else(|| {
            DeployError::ConnectionError(
                "get thingType name failed: thingtypename not found in the returned body".to_string(),
            )
        })
    }

    /// Active, non-revoked certificates of a thing, newest first. Entries
    /// with equal creation times keep their listed order.
    pub async fn get_sorted_active_certificates(
        &self,
        token: &SecretString,
        thing_id: &str,
    ) -> Result<Vec<CertificateSummary>, DeployError> {
        let detail = self.get_thing_detail(token, thing_id).await?;
        Ok(sort_active_certificates(detail.certificates))
    }

    /// Store the SSH connection info of a thing
    pub async fn update_connection_info(
        &self,
        token: &SecretString,
        thing_id: &str,
        info: &ThingConnectionInfo,
    ) -> Result<Value, DeployError> {
        let body = json!({
            "thingconnectioninfo": info,
            "connection_status": true,
        });
        let url = self.api_url(&format!("things/{}", thing_id));
        self.patch(&url, token, "update thing connectionInfo", &body)
            .await
    }
}

/// Keep reusable certificates, newest first, stable for equal timestamps
pub fn sort_active_certificates(certificates: Vec<CertificateSummary>) -> Vec<CertificateSummary> {
    let mut active: Vec<_> = certificates
        .into_iter()
        .filter(CertificateSummary::is_reusable)
        .collect();
    // unparseable timestamps sort last
    active.sort_by(|a, b| b.created_millis().cmp(&a.created_millis()));
    active
}

//! Thing models returned by the management API

use serde::{Deserialize, Serialize};

use crate::models::certificate::CertificateSummary;

/// Management API success envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub result: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThingDetail {
    #[serde(default)]
    pub certificates: Vec<CertificateSummary>,
    #[serde(default)]
    pub thingtypeattributes: Option<ThingTypeAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThingTypeAttributes {
    #[serde(default)]
    pub thingtype: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThingTypeDetail {
    #[serde(default)]
    pub thingtypename: Option<String>,
}

/// Newly issued entity, only its id is used
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedEntity {
    #[serde(default)]
    pub id: Option<String>,
}

/// SSH connection info stored on a thing
#[derive(Debug, Clone, Serialize)]
pub struct ThingConnectionInfo {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

/// Thing types the management service ships with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedThingType {
    RaspberryPi,
    IntelEdison,
    ArduinoYun,
}

impl SupportedThingType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Raspberry Pi" => SupportedThingType::RaspberryPi,
            "Intel Edison" => SupportedThingType::IntelEdison,
            _ => SupportedThingType::ArduinoYun,
        }
    }

    pub fn type_id(&self) -> &'static str {
        match self {
            SupportedThingType::RaspberryPi => "583ff407d2bb340006354cd8",
            SupportedThingType::IntelEdison => "586b3ccfd5636e0007cc257a",
            SupportedThingType::ArduinoYun => "58182b5cfe5c6234200d1125",
        }
    }
}

/// Resource type id of the default temperature resource
pub const DEFAULT_RESOURCE_TYPE_ID: &str = "582ebc5e67ad91000645dec2";

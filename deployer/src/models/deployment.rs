//! Deployment request and result models

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::describe_bytes;

/// Connectivity protocol the device code talks to the management service with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Mqtt,
    #[default]
    Mqtts,
    Http,
    Https,
    Coap,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Mqtt => "mqtt",
            Protocol::Mqtts => "mqtts",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Coap => "coap",
        }
    }

    /// Client certificates are only issued for mqtts
    pub fn needs_client_certificate(&self) -> bool {
        matches!(self, Protocol::Mqtts)
    }

    /// https sample code ships the management root CA
    pub fn needs_root_ca(&self) -> bool {
        matches!(self, Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample SDK flavour copied to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleCodeVariant {
    #[serde(rename = "python-arduino")]
    PythonArduino,
    #[serde(rename = "nodejs-raspberry")]
    NodejsRaspberry,
    #[serde(rename = "nodejs-edison")]
    NodejsEdison,
    #[serde(rename = "python-linkit")]
    PythonLinkit,
}

impl SampleCodeVariant {
    pub fn all() -> [SampleCodeVariant; 4] {
        [
            SampleCodeVariant::PythonArduino,
            SampleCodeVariant::NodejsRaspberry,
            SampleCodeVariant::NodejsEdison,
            SampleCodeVariant::PythonLinkit,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleCodeVariant::PythonArduino => "python-arduino",
            SampleCodeVariant::NodejsRaspberry => "nodejs-raspberry",
            SampleCodeVariant::NodejsEdison => "nodejs-edison",
            SampleCodeVariant::PythonLinkit => "python-linkit",
        }
    }

    /// Location of the variant inside the SDK tree
    pub fn device_path(&self) -> &'static str {
        match self {
            SampleCodeVariant::PythonArduino => "python/device/arduino-yun",
            SampleCodeVariant::NodejsRaspberry => "nodejs/device/raspberrypi",
            SampleCodeVariant::NodejsEdison => "nodejs/device/intel-edison",
            SampleCodeVariant::PythonLinkit => "python/device/mtk-linkit-7688-duo",
        }
    }

    /// Map a thing type name declared in the management service. Names
    /// outside the table fall back to the arduino variant.
    pub fn from_thing_type(type_name: &str) -> Self {
        match type_name {
            "Raspberry Pi" => SampleCodeVariant::NodejsRaspberry,
            "Intel Edison" => SampleCodeVariant::NodejsEdison,
            "LinkIt Smart 7688 Duo" => SampleCodeVariant::PythonLinkit,
            _ => SampleCodeVariant::PythonArduino,
        }
    }

    /// Map a lower-case type query such as `raspberry pi`
    pub fn for_type_query(query: &str) -> Self {
        match query.trim().to_lowercase().as_str() {
            "raspberry pi" => SampleCodeVariant::NodejsRaspberry,
            "intel edison" => SampleCodeVariant::NodejsEdison,
            "linkit smart 7688 duo" => SampleCodeVariant::PythonLinkit,
            "arduino" => SampleCodeVariant::PythonArduino,
            _ => SampleCodeVariant::PythonArduino,
        }
    }
}

impl fmt::Display for SampleCodeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Available sample code types and the default for a type query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleCodeCatalog {
    pub sample_code_types: Vec<&'static str>,
    pub default_type: &'static str,
}

impl SampleCodeCatalog {
    pub fn for_query(query: &str) -> Self {
        Self {
            sample_code_types: SampleCodeVariant::all().iter().map(|v| v.name()).collect(),
            default_type: SampleCodeVariant::for_type_query(query).name(),
        }
    }
}

/// SSH credentials of a device. The password may arrive encrypted with the
/// thing key.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCredentials {
    pub hostname: String,
    pub username: String,
    pub password: SecretString,
}

/// Uploaded user function archive
#[derive(Clone, Default)]
pub struct CodeArchive(Vec<u8>);

impl CodeArchive {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for CodeArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeArchive({})", describe_bytes(&self.0))
    }
}

impl<'de> Deserialize<'de> for CodeArchive {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.trim())
            .map(CodeArchive)
            .map_err(serde::de::Error::custom)
    }
}

/// What to deploy
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DeploymentKind {
    /// Sample SDK for an explicitly chosen variant
    SampleCode {
        folder_path: String,
        sample_code_type: SampleCodeVariant,
    },

    /// Sample SDK for the variant matching the thing's declared type
    InferredSampleCode { folder_path: String },

    /// Uploaded user function, or a re-deploy of the cached copy when no
    /// archive is supplied
    UserFunction {
        function_id: String,
        function_name: String,
        folder_path: String,
        #[serde(default)]
        code: Option<CodeArchive>,
        #[serde(default)]
        cached_code_path: Option<String>,
    },

    /// Connection resource file plus certificates only
    Resources {
        resourceinfo_folder_path: String,
        #[serde(default)]
        cert_folder_path: Option<String>,
        #[serde(default)]
        auto_generate_cert: bool,
    },
}

impl DeploymentKind {
    pub fn name(&self) -> &'static str {
        match self {
            DeploymentKind::SampleCode { .. } => "sample-code",
            DeploymentKind::InferredSampleCode { .. } => "sample-code-inferred",
            DeploymentKind::UserFunction { .. } => "user-function",
            DeploymentKind::Resources { .. } => "resources",
        }
    }
}

/// One accepted deployment request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub thing_id: String,
    pub access_token: SecretString,
    #[serde(flatten)]
    pub credentials: DeviceCredentials,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(flatten)]
    pub kind: DeploymentKind,
}

/// Connectivity test or connection-info update for one thing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingConnectionRequest {
    pub thing_id: String,
    #[serde(default)]
    pub access_token: Option<SecretString>,
    #[serde(flatten)]
    pub credentials: DeviceCredentials,
}

/// Certificate files as installed on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateLocations {
    pub id: String,
    pub location: String,
    pub ca_cert: String,
    pub client_cert: String,
    pub private_cert: String,
}

/// Result object of a successful deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codepath: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_code_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificates: Option<CertificateLocations>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resourceinfo: Option<String>,
}

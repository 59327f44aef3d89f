//! Certificate models

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;

use crate::models::deployment::CertificateLocations;

/// Certificate entry listed on a thing
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateSummary {
    pub id: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_revoked: bool,
    #[serde(default)]
    pub created_on: Option<String>,
}

impl CertificateSummary {
    /// Only active, non-revoked certificates can be handed out again
    pub fn is_reusable(&self) -> bool {
        self.is_active && !self.is_revoked
    }

    /// Creation time in milliseconds since the epoch, if it parses
    pub fn created_millis(&self) -> Option<i64> {
        let raw = self.created_on.as_deref()?.trim();
        if let Ok(ts) = DateTime::<FixedOffset>::parse_from_rfc3339(raw) {
            return Some(ts.timestamp_millis());
        }
        // timestamps without an offset are taken as UTC
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|ts| ts.and_utc().timestamp_millis())
    }
}

/// Certificate detail with the download locations of its PEM files
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDetail {
    pub client_cert: Option<String>,
    pub ca_cert: Option<String>,
    pub private_cert: Option<String>,
}

/// The three PEM files of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemKind {
    Client,
    Ca,
    Private,
}

impl PemKind {
    /// Download order
    pub const ALL: [PemKind; 3] = [PemKind::Client, PemKind::Ca, PemKind::Private];

    /// Field name in the certificate detail
    pub fn field(&self) -> &'static str {
        match self {
            PemKind::Client => "clientCert",
            PemKind::Ca => "caCert",
            PemKind::Private => "privateCert",
        }
    }

    pub fn location<'a>(&self, detail: &'a CertificateDetail) -> Option<&'a str> {
        match self {
            PemKind::Client => detail.client_cert.as_deref(),
            PemKind::Ca => detail.ca_cert.as_deref(),
            PemKind::Private => detail.private_cert.as_deref(),
        }
    }
}

/// Certificate material staged for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub id: String,
    /// PEM file names, as matched in the detail locations
    pub client_cert: String,
    pub ca_cert: String,
    pub private_cert: String,
    /// Local directory the PEM files were downloaded into
    pub staging_dir: PathBuf,
    /// Remote directory the PEM files are copied to
    pub remote_dir: String,
}

impl CertificateBundle {
    /// Where the files end up on the device, reported under `location`
    pub fn locations(&self, location: &str) -> CertificateLocations {
        let remote = |name: &str| format!("{}/{}", self.remote_dir.trim_end_matches('/'), name);
        CertificateLocations {
            id: self.id.clone(),
            location: location.to_string(),
            ca_cert: remote(&self.ca_cert),
            client_cert: remote(&self.client_cert),
            private_cert: remote(&self.private_cert),
        }
    }
}

//! Backend credential model
//!
//! One struct per provider kind, wrapped in a tagged union, so a parsed
//! credential set carries compile-time guarantees about its required
//! fields. The raw-bag completeness check (for bags arriving over the API
//! before parsing) lives in the validation service.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which backend a tenant's storage is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    S3,
    Gcs,
    Azure,
    Local,
}

impl ProviderKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::S3 => "s3",
            ProviderKind::Gcs => "gcs",
            ProviderKind::Azure => "azure",
            ProviderKind::Local => "local",
        }
    }

    /// Closed list of fields a raw credential bag must populate for this
    /// kind before any live validation is attempted
    pub const fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::S3 => &["access_key", "secret_key", "region", "bucket"],
            ProviderKind::Gcs => &["project_id", "service_account_key", "bucket"],
            ProviderKind::Azure => &["account_name", "account_key", "container"],
            ProviderKind::Local => &["root_path"],
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s3" => Ok(ProviderKind::S3),
            "gcs" => Ok(ProviderKind::Gcs),
            "azure" => Ok(ProviderKind::Azure),
            "local" => Ok(ProviderKind::Local),
            other => Err(Error::Configuration(format!(
                "unknown provider kind: {other}"
            ))),
        }
    }
}

/// S3-compatible backend credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,

    /// Custom endpoint for S3-compatible stores; the AWS default otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Path-style addressing, needed by most self-hosted stores
    #[serde(default)]
    pub force_path_style: bool,
}

/// Google Cloud Storage credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct GcsCredentials {
    pub project_id: String,
    /// Full service-account key JSON
    pub service_account_key: String,
    pub bucket: String,
}

/// Azure Blob Storage credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct AzureCredentials {
    pub account_name: String,
    pub account_key: String,
    pub container: String,
}

/// Local filesystem backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCredentials {
    pub root_path: String,
}

/// A tenant's decrypted credential set.
///
/// Exists only transiently in memory during an operation; at rest it lives
/// inside a `StorageConfig` as a sealed blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum StorageCredentials {
    S3(S3Credentials),
    Gcs(GcsCredentials),
    Azure(AzureCredentials),
    Local(LocalCredentials),
}

impl StorageCredentials {
    pub const fn kind(&self) -> ProviderKind {
        match self {
            StorageCredentials::S3(_) => ProviderKind::S3,
            StorageCredentials::Gcs(_) => ProviderKind::Gcs,
            StorageCredentials::Azure(_) => ProviderKind::Azure,
            StorageCredentials::Local(_) => ProviderKind::Local,
        }
    }
}

// Secrets never appear in Debug output; logs format credentials through
// these impls.

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl std::fmt::Debug for GcsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsCredentials")
            .field("project_id", &self.project_id)
            .field("service_account_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("container", &self.container)
            .finish()
    }
}

//! StorageProvider trait definition
//!
//! This trait defines the uniform capability set every storage backend
//! implements. It keeps the core decoupled from the individual backend
//! SDKs and lets tests substitute scripted providers.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::credentials::{ProviderKind, StorageCredentials};
use crate::error::{Error, Result, ValidationCode};

/// Default lifetime for signed download URLs
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Optional feature flags for a backend.
///
/// The batch coordinator and callers use these to distinguish "this backend
/// cannot do it" from "the operation failed" without a round trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// Native server-side object copy
    pub server_side_copy: bool,

    /// Atomic rename; without it a move is copy-then-delete
    pub native_move: bool,

    /// Time-bounded signed download URLs
    pub signed_urls: bool,

    /// Arbitrary key/value metadata on objects
    pub object_metadata: bool,

    /// Replacing metadata during a server-side copy
    pub metadata_replace: bool,
}

/// Metadata attached to every upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub tenant_id: String,
    pub original_name: String,

    /// Caller-supplied extras, forwarded verbatim
    pub extra: HashMap<String, String>,
}

impl UploadMetadata {
    pub fn new(tenant_id: impl Into<String>, original_name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            original_name: original_name.into(),
            extra: HashMap::new(),
        }
    }

    /// Flatten into the key/value map stored on the object, stamping the
    /// upload time
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = self.extra.clone();
        map.insert("tenant-id".into(), self.tenant_id.clone());
        map.insert("original-name".into(), self.original_name.clone());
        map.insert("uploaded-at".into(), jiff::Timestamp::now().to_string());
        map
    }
}

/// Result of a completed upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    /// Provider-scheme URL of the stored object
    pub file_url: String,

    /// Final provider key the object was stored under
    pub full_path: String,

    /// Publicly resolvable URL, when the backend has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// Metadata as attached to the object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Result of a list operation: a flat, de-duplicated set of provider keys,
/// already drained past any backend page-size limit
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListObjectsResult {
    pub keys: Vec<String>,
}

/// Outcome of a move.
///
/// The copy-then-delete sequence is not atomic; when the source delete
/// fails after a successful copy the object exists at both locations and
/// the caller must see that, not a plain success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Copy and source delete both completed
    Completed,

    /// Copy succeeded but the source delete failed; the object now exists
    /// at both locations
    SourceRetained { reason: String },
}

/// Backend facts gathered during a successful credential check
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

/// Structured result of a credential check.
///
/// Never persisted as-is; only the validated flag and error message make it
/// into the stored `StorageConfig`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ValidationCode>,

    pub message: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_info: Option<StorageInfo>,
}

impl ValidationResult {
    pub fn ok(message: impl Into<String>, storage_info: Option<StorageInfo>) -> Self {
        Self {
            is_valid: true,
            error_code: None,
            message: message.into(),
            suggestions: Vec::new(),
            storage_info,
        }
    }

    pub fn failure(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_code: Some(code),
            message: message.into(),
            suggestions: Vec::new(),
            storage_info: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Lift a failed result into the error taxonomy; `None` when valid
    pub fn as_error(&self) -> Option<Error> {
        (!self.is_valid).then(|| Error::Validation {
            code: self.error_code.unwrap_or(ValidationCode::Unknown),
            message: self.message.clone(),
            suggestions: self.suggestions.clone(),
        })
    }
}

/// Uniform capability set over storage backends.
///
/// One instance is bound to one tenant's credentials for the lifetime of a
/// single logical request; instances are never shared across tenants.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Which backend this provider talks to
    fn kind(&self) -> ProviderKind;

    /// Feature flags for this backend
    fn capabilities(&self) -> Capabilities;

    /// Pure readiness predicate, no I/O
    fn is_configured(&self) -> bool;

    /// Bind backend client state to `credentials` and run a cheap
    /// existence probe.
    ///
    /// Fails fast: on any error the provider stays unconfigured rather
    /// than half-initialized.
    async fn initialize(&mut self, credentials: StorageCredentials) -> Result<()>;

    /// Stream a local temp file to the backend.
    ///
    /// The source is never fully buffered in memory. Tenant id, original
    /// name and upload timestamp are attached as object metadata on
    /// backends that support it.
    async fn upload_file(
        &self,
        local_path: &Path,
        destination: &str,
        mime_type: Option<&str>,
        metadata: &UploadMetadata,
    ) -> Result<UploadResult>;

    /// Time-bounded, backend-signed download URL.
    ///
    /// `expires_in` falls back to the provider's configured default
    /// (normally [`DEFAULT_URL_EXPIRY`], injectable for tests).
    async fn download_url(
        &self,
        path: &str,
        expires_in: Option<Duration>,
        tenant_id: &str,
    ) -> Result<String>;

    /// Delete a single object
    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Create a folder marker; returns the marker key
    async fn create_folder(&self, path: &str) -> Result<String>;

    /// List provider keys under a prefix, paginating transparently past
    /// any single backend page limit. `max_keys` caps the total collected.
    async fn list_objects(
        &self,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsResult>;

    /// Server-side copy. Source metadata is preserved unless
    /// `replace_metadata` is set, in which case `metadata` fully replaces
    /// it.
    async fn copy_object(
        &self,
        from: &str,
        to: &str,
        metadata: Option<&HashMap<String, String>>,
        replace_metadata: bool,
    ) -> Result<()>;

    /// Move an object; copy-then-delete unless the backend renames
    /// natively. See [`MoveOutcome`] for the partial-failure contract.
    async fn move_object(&self, from: &str, to: &str) -> Result<MoveOutcome>;

    /// Cheapest possible live check of a *candidate* credential set,
    /// independent of the credentials this instance was initialized with.
    /// Always returns a structured result, never a raw backend error.
    async fn validate_credentials(
        &self,
        candidate: &StorageCredentials,
    ) -> Result<ValidationResult>;

    /// Cheap, side-effect-free liveness probe; false rather than an error
    /// when the provider is unconfigured
    async fn health_check(&self) -> bool;
}

//! stowage-core: Core library for the stowage storage gateway
//!
//! This crate provides the backend-independent pieces of the storage
//! layer:
//! - StorageProvider trait: the uniform capability set over backends
//! - Credential vault: authenticated encryption of provider credentials
//! - Path normalization for virtual paths
//! - Tenant storage configuration and its persistence
//! - Credential validation
//! - Batch copy engine with bounded concurrency
//!
//! This crate is designed to be independent of any specific backend SDK;
//! the concrete providers live in stowage-providers.

pub mod batch;
pub mod config;
pub mod credentials;
pub mod error;
pub mod path;
pub mod settings;
pub mod traits;
pub mod validation;
pub mod vault;

pub use batch::{
    BatchCoordinator, BatchItemResult, BatchMapping, BatchOutcome, BatchReport,
    DEFAULT_BATCH_CONCURRENCY,
};
pub use config::{ConfigStore, StorageConfig};
pub use credentials::{
    AzureCredentials, GcsCredentials, LocalCredentials, ProviderKind, S3Credentials,
    StorageCredentials,
};
pub use error::{Error, OperationErrorKind, Result, ValidationCode};
pub use path::{ROUTING_PREFIX, normalize, normalize_key, provider_key, strip_routing_prefix};
pub use settings::Settings;
pub use traits::{
    Capabilities, DEFAULT_URL_EXPIRY, ListObjectsResult, MoveOutcome, StorageInfo,
    StorageProvider, UploadMetadata, UploadResult, ValidationResult,
};
pub use validation::ValidationService;
pub use vault::{CredentialVault, EncryptedPayload, MasterKey};

//! stowage-providers: backend implementations for the stowage storage
//! gateway
//!
//! This crate provides the concrete StorageProvider implementations (S3,
//! GCS, Azure Blob, local filesystem) and the resolver that constructs
//! and initializes them from a tenant's stored config. It is the only
//! crate that depends on backend SDKs.

pub mod azure;
pub mod gcs;
pub mod local;
mod remote;
pub mod resolver;
pub mod s3;

pub use azure::AzureProvider;
pub use gcs::GcsProvider;
pub use local::LocalProvider;
pub use resolver::ProviderResolver;
pub use s3::S3Provider;

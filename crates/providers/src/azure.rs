//! Azure Blob Storage provider implementation
//!
//! Built on object_store's Azure backend with shared-key (account name +
//! account key) authentication. Signed URLs are SAS URLs derived from the
//! account key.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use object_store::azure::MicrosoftAzureBuilder;
use tracing::info;

use stowage_core::{
    AzureCredentials, Capabilities, Error, ListObjectsResult, MoveOutcome, ProviderKind, Result,
    StorageCredentials, StorageInfo, StorageProvider, UploadMetadata, UploadResult,
    ValidationCode, ValidationResult, traits::DEFAULT_URL_EXPIRY,
};

use crate::remote::{RemoteStore, validation_code};

/// Azure Blob storage provider.
///
/// One instance binds one tenant's credentials; construct fresh per
/// request.
pub struct AzureProvider {
    remote: Option<RemoteStore>,
    url_expiry: Duration,
}

impl AzureProvider {
    pub fn new() -> Self {
        Self {
            remote: None,
            url_expiry: DEFAULT_URL_EXPIRY,
        }
    }

    /// Override the default signed-URL lifetime (test determinism)
    pub fn with_url_expiry(mut self, expiry: Duration) -> Self {
        self.url_expiry = expiry;
        self
    }

    fn build_store(
        credentials: &AzureCredentials,
    ) -> Result<object_store::azure::MicrosoftAzure> {
        MicrosoftAzureBuilder::new()
            .with_account(credentials.account_name.clone())
            .with_access_key(credentials.account_key.clone())
            .with_container_name(credentials.container.clone())
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build Azure client: {e}")))
    }

    fn ready(&self) -> Result<&RemoteStore> {
        self.remote
            .as_ref()
            .ok_or_else(|| Error::Configuration("Azure provider is not initialized".into()))
    }
}

impl Default for AzureProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for AzureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            server_side_copy: true,
            native_move: false,
            signed_urls: true,
            object_metadata: true,
            // object_store copy cannot rewrite metadata in flight
            metadata_replace: false,
        }
    }

    fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    async fn initialize(&mut self, credentials: StorageCredentials) -> Result<()> {
        let StorageCredentials::Azure(credentials) = credentials else {
            return Err(Error::Configuration(format!(
                "expected Azure credentials, got {}",
                credentials.kind()
            )));
        };

        let store = Self::build_store(&credentials)?;
        let remote = RemoteStore::new(Arc::new(store), credentials.container.clone(), "az");
        remote.probe().await?;

        info!(
            container = %credentials.container,
            account = %credentials.account_name,
            "azure provider initialized"
        );
        self.remote = Some(remote);
        Ok(())
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        destination: &str,
        mime_type: Option<&str>,
        metadata: &UploadMetadata,
    ) -> Result<UploadResult> {
        self.ready()?
            .upload_file(local_path, destination, mime_type, metadata)
            .await
    }

    async fn download_url(
        &self,
        path: &str,
        expires_in: Option<Duration>,
        tenant_id: &str,
    ) -> Result<String> {
        self.ready()?
            .download_url(path, expires_in.unwrap_or(self.url_expiry), tenant_id)
            .await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.ready()?.delete_file(path).await
    }

    async fn create_folder(&self, path: &str) -> Result<String> {
        self.ready()?.create_folder(path).await
    }

    async fn list_objects(
        &self,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsResult> {
        self.ready()?.list_objects(prefix, max_keys).await
    }

    async fn copy_object(
        &self,
        from: &str,
        to: &str,
        _metadata: Option<&HashMap<String, String>>,
        replace_metadata: bool,
    ) -> Result<()> {
        self.ready()?.copy_object(from, to, replace_metadata).await
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<MoveOutcome> {
        self.ready()?.move_object(from, to).await
    }

    async fn validate_credentials(
        &self,
        candidate: &StorageCredentials,
    ) -> Result<ValidationResult> {
        let StorageCredentials::Azure(candidate) = candidate else {
            return Ok(ValidationResult::failure(
                ValidationCode::Unknown,
                "credential kind does not match the Azure provider",
            ));
        };

        let store = match Self::build_store(candidate) {
            Ok(store) => store,
            Err(e) => {
                return Ok(ValidationResult::failure(
                    ValidationCode::AuthRejected,
                    format!("credentials were rejected while building the client: {e}"),
                )
                .with_suggestions(vec![
                    "check the account name and base64 account key".into(),
                ]));
            }
        };

        let remote = RemoteStore::new(Arc::new(store), candidate.container.clone(), "az");
        match remote.probe_raw().await {
            Ok(()) => Ok(ValidationResult::ok(
                format!("container {} is reachable", candidate.container),
                Some(StorageInfo {
                    bucket: Some(candidate.container.clone()),
                    region: None,
                    permissions: vec!["read".into()],
                }),
            )),
            Err(e) => {
                let code = validation_code(&e);
                Ok(ValidationResult::failure(
                    code,
                    format!("credential check failed: {e}"),
                )
                .with_suggestions(match code {
                    ValidationCode::BucketNotFound => {
                        vec!["check the container name".into()]
                    }
                    ValidationCode::AuthRejected => {
                        vec!["check the account key".into()]
                    }
                    ValidationCode::InsufficientPermissions => {
                        vec!["grant the key access to the container".into()]
                    }
                    _ => Vec::new(),
                }))
            }
        }
    }

    async fn health_check(&self) -> bool {
        match &self.remote {
            Some(remote) => remote.health_check().await,
            None => false,
        }
    }
}

//! Provider resolution
//!
//! Turns a tenant's stored (encrypted) config into a live, initialized
//! provider. One switch on the stored kind constructs the matching
//! implementation; there is no dynamic registry. Every resolution returns
//! a fresh owned instance bound to that tenant's credentials, so provider
//! state is never shared across tenants or concurrent requests.

use tracing::debug;

use stowage_core::{
    ConfigStore, CredentialVault, Error, ProviderKind, Result, StorageConfig, StorageCredentials,
    StorageProvider, ValidationResult, ValidationService,
};

use crate::azure::AzureProvider;
use crate::gcs::GcsProvider;
use crate::local::LocalProvider;
use crate::s3::S3Provider;

/// Resolves tenants' storage configs into initialized providers
pub struct ProviderResolver {
    vault: CredentialVault,
}

impl ProviderResolver {
    pub fn new(vault: CredentialVault) -> Self {
        Self { vault }
    }

    /// Fresh, unconfigured provider for `kind`.
    ///
    /// Usable only for `validate_credentials` and `health_check`; every
    /// other operation fails with a configuration error until
    /// `initialize` succeeds.
    pub fn bare(kind: ProviderKind) -> Box<dyn StorageProvider> {
        match kind {
            ProviderKind::S3 => Box::new(S3Provider::new()),
            ProviderKind::Gcs => Box::new(GcsProvider::new()),
            ProviderKind::Azure => Box::new(AzureProvider::new()),
            ProviderKind::Local => Box::new(LocalProvider::new()),
        }
    }

    /// Decrypt a tenant's config and return an initialized provider.
    ///
    /// The decrypted credentials live only for the duration of this call
    /// and the returned provider's client state.
    pub async fn resolve(&self, config: &StorageConfig) -> Result<Box<dyn StorageProvider>> {
        if !config.is_active {
            return Err(Error::Configuration(format!(
                "storage config for tenant {} is deactivated",
                config.tenant_id
            )));
        }

        let credentials = self.vault.open_credentials(&config.credentials)?;
        if credentials.kind() != config.provider {
            return Err(Error::Configuration(format!(
                "stored credentials are for {} but the config names {}",
                credentials.kind(),
                config.provider
            )));
        }

        let mut provider = Self::bare(config.provider);
        provider.initialize(credentials).await?;

        debug!(tenant_id = %config.tenant_id, provider = %config.provider, "provider resolved");
        Ok(provider)
    }

    /// Look up a tenant in the store and resolve its provider
    pub async fn resolve_tenant(
        &self,
        store: &ConfigStore,
        tenant_id: &str,
    ) -> Result<Box<dyn StorageProvider>> {
        let config = store.get(tenant_id)?;
        self.resolve(&config).await
    }

    /// Seal a credential set for storage inside a `StorageConfig`
    pub fn seal_credentials(&self, credentials: &StorageCredentials) -> Result<String> {
        self.vault.seal_credentials(credentials)
    }

    /// Validate a candidate credential bag for `kind` against a bare
    /// provider: structural completeness first, live check only if
    /// complete.
    pub async fn validate_candidate(
        &self,
        kind: ProviderKind,
        bag: &serde_json::Value,
    ) -> Result<ValidationResult> {
        let provider = Self::bare(kind);
        ValidationService::new()
            .validate(provider.as_ref(), kind, bag)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::{LocalCredentials, MasterKey, ValidationCode};
    use tempfile::TempDir;

    fn resolver() -> ProviderResolver {
        ProviderResolver::new(CredentialVault::new(MasterKey::from_bytes([7u8; 32])))
    }

    #[test]
    fn test_bare_kinds() {
        for kind in [
            ProviderKind::S3,
            ProviderKind::Gcs,
            ProviderKind::Azure,
            ProviderKind::Local,
        ] {
            let provider = ProviderResolver::bare(kind);
            assert_eq!(provider.kind(), kind);
            assert!(!provider.is_configured());
        }
    }

    #[tokio::test]
    async fn test_resolve_roundtrip_local() {
        let root = TempDir::new().unwrap();
        let resolver = resolver();

        let credentials = StorageCredentials::Local(LocalCredentials {
            root_path: root.path().to_string_lossy().into_owned(),
        });
        let sealed = resolver.seal_credentials(&credentials).unwrap();
        let config = StorageConfig::new("tenant-1", ProviderKind::Local, sealed);

        let provider = resolver.resolve(&config).await.unwrap();
        assert!(provider.is_configured());
        assert_eq!(provider.kind(), ProviderKind::Local);
    }

    #[tokio::test]
    async fn test_resolve_rejects_deactivated_config() {
        let root = TempDir::new().unwrap();
        let resolver = resolver();

        let credentials = StorageCredentials::Local(LocalCredentials {
            root_path: root.path().to_string_lossy().into_owned(),
        });
        let sealed = resolver.seal_credentials(&credentials).unwrap();
        let mut config = StorageConfig::new("tenant-1", ProviderKind::Local, sealed);
        config.is_active = false;

        let Err(err) = resolver.resolve(&config).await else {
            panic!("expected resolve to fail");
        };
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_resolve_rejects_kind_mismatch() {
        let root = TempDir::new().unwrap();
        let resolver = resolver();

        let credentials = StorageCredentials::Local(LocalCredentials {
            root_path: root.path().to_string_lossy().into_owned(),
        });
        let sealed = resolver.seal_credentials(&credentials).unwrap();
        // Config claims S3 but the blob holds local credentials
        let config = StorageConfig::new("tenant-1", ProviderKind::S3, sealed);

        let Err(err) = resolver.resolve(&config).await else {
            panic!("expected resolve to fail");
        };
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_resolve_corrupted_blob_is_decryption_error() {
        let config = StorageConfig::new("tenant-1", ProviderKind::Local, "not a payload");
        let Err(err) = resolver().resolve(&config).await else {
            panic!("expected resolve to fail");
        };
        assert!(matches!(err, Error::Decryption(_)));
    }

    #[tokio::test]
    async fn test_resolve_wrong_key_is_decryption_error() {
        let root = TempDir::new().unwrap();
        let sealing = resolver();
        let credentials = StorageCredentials::Local(LocalCredentials {
            root_path: root.path().to_string_lossy().into_owned(),
        });
        let sealed = sealing.seal_credentials(&credentials).unwrap();
        let config = StorageConfig::new("tenant-1", ProviderKind::Local, sealed);

        let other =
            ProviderResolver::new(CredentialVault::new(MasterKey::from_bytes([8u8; 32])));
        let Err(err) = other.resolve(&config).await else {
            panic!("expected resolve to fail");
        };
        assert!(matches!(err, Error::Decryption(_)));
    }

    #[tokio::test]
    async fn test_validate_candidate_missing_fields_never_builds_clients() {
        let resolver = resolver();
        let bag = serde_json::json!({ "account_name": "acct" });

        let result = resolver
            .validate_candidate(ProviderKind::Azure, &bag)
            .await
            .unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.error_code, Some(ValidationCode::MissingFields));
    }
}

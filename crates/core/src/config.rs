//! Tenant storage configuration
//!
//! This module handles loading, saving, and migrating tenant storage
//! configs. The store is a TOML file at ~/.config/stowage/configs.toml;
//! credential material inside it is always the sealed blob form, never
//! plaintext.
//!
//! PROTECTED FILE: Changes to schema_version require migration support.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::credentials::ProviderKind;
use crate::error::{Error, Result};
use crate::traits::ValidationResult;

/// Current configuration schema version
///
/// IMPORTANT: Bumping this version requires:
/// 1. Adding a migration in migrate()
/// 2. Updating migration tests
/// 3. Marking the change as BREAKING
pub const SCHEMA_VERSION: u32 = 1;

/// One tenant's storage binding.
///
/// Created on first provider setup, mutated on re-validation or credential
/// rotation, never physically deleted: teardown is a soft deactivation so
/// the sealed credentials survive for audit and recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub tenant_id: String,

    pub provider: ProviderKind,

    /// Sealed credential blob: `EncryptedPayload` JSON string
    pub credentials: String,

    /// Whether the stored credentials passed their last live check
    #[serde(default)]
    pub is_validated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<jiff::Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl StorageConfig {
    /// A fresh, not-yet-validated config for a tenant
    pub fn new(
        tenant_id: impl Into<String>,
        provider: ProviderKind,
        sealed_credentials: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            provider,
            credentials: sealed_credentials.into(),
            is_validated: false,
            last_validated_at: None,
            validation_error: None,
            is_active: true,
        }
    }
}

/// On-disk layout of the config store
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    schema_version: u32,

    #[serde(default)]
    configs: Vec<StorageConfig>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            configs: Vec::new(),
        }
    }
}

/// Persistence for tenant storage configs
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a ConfigStore at the default location
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Configuration("Could not determine config directory".into()))?;
        Ok(Self {
            path: config_dir.join("stowage").join("configs.toml"),
        })
    }

    /// Create a ConfigStore with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let mut store: StoreFile = toml::from_str(&content)?;

        if store.schema_version < SCHEMA_VERSION {
            store = self.migrate(store)?;
        } else if store.schema_version > SCHEMA_VERSION {
            return Err(Error::Configuration(format!(
                "Config store version {} is newer than supported version {}. Please upgrade stowage.",
                store.schema_version, SCHEMA_VERSION
            )));
        }

        Ok(store)
    }

    /// Save the store to disk.
    ///
    /// Creates parent directories if they don't exist and sets file
    /// permissions to 600 (owner read/write only).
    fn save(&self, store: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(store)?;
        std::fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, permissions)?;
        }

        Ok(())
    }

    fn migrate(&self, store: StoreFile) -> Result<StoreFile> {
        let mut store = store;

        // Add migration logic here when the schema version is bumped

        store.schema_version = SCHEMA_VERSION;
        Ok(store)
    }

    /// All stored configs, active and deactivated
    pub fn list(&self) -> Result<Vec<StorageConfig>> {
        Ok(self.load()?.configs)
    }

    /// Get a tenant's config
    pub fn get(&self, tenant_id: &str) -> Result<StorageConfig> {
        self.load()?
            .configs
            .into_iter()
            .find(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| {
                Error::Configuration(format!("no storage config for tenant {tenant_id}"))
            })
    }

    /// Add or replace a tenant's config
    pub fn set(&self, config: StorageConfig) -> Result<()> {
        let mut store = self.load()?;
        store.configs.retain(|c| c.tenant_id != config.tenant_id);
        store.configs.push(config);
        self.save(&store)
    }

    /// Soft-deactivate a tenant's config.
    ///
    /// The record stays on disk; only `is_active` flips. There is no hard
    /// delete.
    pub fn deactivate(&self, tenant_id: &str) -> Result<()> {
        self.update(tenant_id, |config| {
            config.is_active = false;
        })
    }

    /// Replace a tenant's sealed credentials, resetting validation state
    pub fn rotate_credentials(
        &self,
        tenant_id: &str,
        sealed_credentials: impl Into<String>,
    ) -> Result<()> {
        let sealed = sealed_credentials.into();
        self.update(tenant_id, move |config| {
            config.credentials = sealed;
            config.is_validated = false;
            config.last_validated_at = None;
            config.validation_error = None;
        })
    }

    /// Persist the outcome of a credential check.
    ///
    /// Only the validated flag, timestamp and error message are retained;
    /// the full result is never stored.
    pub fn record_validation(&self, tenant_id: &str, result: &ValidationResult) -> Result<()> {
        let is_valid = result.is_valid;
        let error = (!result.is_valid).then(|| result.message.clone());
        self.update(tenant_id, move |config| {
            config.is_validated = is_valid;
            config.last_validated_at = Some(jiff::Timestamp::now());
            config.validation_error = error;
        })
    }

    fn update(&self, tenant_id: &str, apply: impl FnOnce(&mut StorageConfig)) -> Result<()> {
        let mut store = self.load()?;
        let config = store
            .configs
            .iter_mut()
            .find(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| {
                Error::Configuration(format!("no storage config for tenant {tenant_id}"))
            })?;
        apply(config);
        self.save(&store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationCode;
    use tempfile::TempDir;

    fn temp_store() -> (ConfigStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::with_path(temp_dir.path().join("configs.toml"));
        (store, temp_dir)
    }

    fn sample_config(tenant: &str) -> StorageConfig {
        StorageConfig::new(
            tenant,
            ProviderKind::S3,
            r#"{"iv":"00","authTag":"00","encrypted":"00"}"#,
        )
    }

    #[test]
    fn test_get_missing_tenant() {
        let (store, _temp_dir) = temp_store();
        assert!(store.get("nobody").is_err());
    }

    #[test]
    fn test_set_and_get() {
        let (store, _temp_dir) = temp_store();
        store.set(sample_config("tenant-1")).unwrap();

        let loaded = store.get("tenant-1").unwrap();
        assert_eq!(loaded.provider, ProviderKind::S3);
        assert!(loaded.is_active);
        assert!(!loaded.is_validated);
    }

    #[test]
    fn test_set_replaces_existing() {
        let (store, _temp_dir) = temp_store();
        store.set(sample_config("tenant-1")).unwrap();

        let mut updated = sample_config("tenant-1");
        updated.provider = ProviderKind::Gcs;
        store.set(updated).unwrap();

        let configs = store.list().unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].provider, ProviderKind::Gcs);
    }

    #[test]
    fn test_deactivate_is_soft() {
        let (store, _temp_dir) = temp_store();
        store.set(sample_config("tenant-1")).unwrap();
        store.deactivate("tenant-1").unwrap();

        // The record survives; only the flag flips
        let loaded = store.get("tenant-1").unwrap();
        assert!(!loaded.is_active);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_rotate_credentials_resets_validation() {
        let (store, _temp_dir) = temp_store();
        let mut config = sample_config("tenant-1");
        config.is_validated = true;
        config.last_validated_at = Some(jiff::Timestamp::now());
        store.set(config).unwrap();

        store
            .rotate_credentials("tenant-1", r#"{"iv":"11","authTag":"11","encrypted":"11"}"#)
            .unwrap();

        let loaded = store.get("tenant-1").unwrap();
        assert!(!loaded.is_validated);
        assert!(loaded.last_validated_at.is_none());
        assert!(loaded.credentials.contains("11"));
    }

    #[test]
    fn test_record_validation() {
        let (store, _temp_dir) = temp_store();
        store.set(sample_config("tenant-1")).unwrap();

        let failed = ValidationResult::failure(ValidationCode::AuthRejected, "bad key");
        store.record_validation("tenant-1", &failed).unwrap();
        let loaded = store.get("tenant-1").unwrap();
        assert!(!loaded.is_validated);
        assert_eq!(loaded.validation_error.as_deref(), Some("bad key"));
        assert!(loaded.last_validated_at.is_some());

        let ok = ValidationResult::ok("reachable", None);
        store.record_validation("tenant-1", &ok).unwrap();
        let loaded = store.get("tenant-1").unwrap();
        assert!(loaded.is_validated);
        assert!(loaded.validation_error.is_none());
    }

    #[test]
    fn test_schema_version_too_new() {
        let (store, _temp_dir) = temp_store();
        std::fs::write(
            store.path(),
            format!("schema_version = {}\n", SCHEMA_VERSION + 1),
        )
        .unwrap();

        let result = store.list();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("newer than supported")
        );
    }
}

//! Local filesystem provider implementation
//!
//! Stores objects as plain files under a configured root directory. Keys
//! map to relative paths; folder semantics are real directories. Used for
//! self-hosted deployments without an object store.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::{info, warn};

use stowage_core::{
    Capabilities, Error, ListObjectsResult, LocalCredentials, MoveOutcome, OperationErrorKind,
    ProviderKind, Result, StorageCredentials, StorageInfo, StorageProvider, UploadMetadata,
    UploadResult, ValidationCode, ValidationResult, normalize, normalize_key,
};

/// Local filesystem storage provider.
///
/// One instance binds one tenant's root; construct fresh per request.
pub struct LocalProvider {
    root: Option<PathBuf>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self { root: None }
    }

    fn ready(&self) -> Result<&PathBuf> {
        self.root
            .as_ref()
            .ok_or_else(|| Error::Configuration("local provider is not initialized".into()))
    }

    /// Resolve a virtual path inside the root, refusing traversal out of it
    fn resolve(&self, path: &str) -> Result<(PathBuf, String)> {
        let root = self.ready()?;
        let key = normalize_key(path);

        let relative = Path::new(&key);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::Configuration(format!(
                "path escapes the storage root: {path}"
            )));
        }

        Ok((root.join(relative), key))
    }

    fn map_io_error(e: std::io::Error, context: &str) -> Error {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => OperationErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => OperationErrorKind::Forbidden,
            _ => OperationErrorKind::Other,
        };
        Error::operation(kind, format!("{context}: {e}"))
    }

    /// Collect every file key under `dir`, relative to the root
    async fn walk(root: &Path) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![root.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| Self::map_io_error(e, "list failed"))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::map_io_error(e, "list failed"))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Self::map_io_error(e, "list failed"))?;

                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    let relative = path.strip_prefix(root).unwrap_or(&path);
                    keys.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            server_side_copy: true,
            native_move: true,
            signed_urls: false,
            object_metadata: false,
            metadata_replace: false,
        }
    }

    fn is_configured(&self) -> bool {
        self.root.is_some()
    }

    async fn initialize(&mut self, credentials: StorageCredentials) -> Result<()> {
        let StorageCredentials::Local(credentials) = credentials else {
            return Err(Error::Configuration(format!(
                "expected local credentials, got {}",
                credentials.kind()
            )));
        };

        let root = fs::canonicalize(&credentials.root_path).await.map_err(|_| {
            Error::Configuration(format!(
                "root path does not exist: {}",
                credentials.root_path
            ))
        })?;

        let metadata = fs::metadata(&root).await?;
        if !metadata.is_dir() {
            return Err(Error::Configuration(format!(
                "root path is not a directory: {}",
                credentials.root_path
            )));
        }

        info!(root = %root.display(), "local provider initialized");
        self.root = Some(root);
        Ok(())
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        destination: &str,
        _mime_type: Option<&str>,
        metadata: &UploadMetadata,
    ) -> Result<UploadResult> {
        let (target, key) = self.resolve(destination)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io_error(e, "upload failed"))?;
        }

        // fs::copy streams at the OS level; nothing is buffered here.
        fs::copy(local_path, &target)
            .await
            .map_err(|e| Self::map_io_error(e, "upload failed"))?;

        Ok(UploadResult {
            file_url: format!("file://{}", target.display()),
            full_path: key,
            public_url: None,
            // No metadata store on a plain filesystem
            metadata: None,
        })
    }

    async fn download_url(
        &self,
        _path: &str,
        _expires_in: Option<Duration>,
        _tenant_id: &str,
    ) -> Result<String> {
        self.ready()?;
        Err(Error::unsupported(
            "the local backend cannot issue signed URLs",
        ))
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let (target, _) = self.resolve(path)?;
        fs::remove_file(&target)
            .await
            .map_err(|e| Self::map_io_error(e, "delete failed"))
    }

    async fn create_folder(&self, path: &str) -> Result<String> {
        let folder = normalize(path);
        if folder.is_empty() {
            return Err(Error::Configuration(
                "cannot create a folder at the storage root".into(),
            ));
        }

        let (target, _) = self.resolve(&folder)?;
        fs::create_dir_all(&target)
            .await
            .map_err(|e| Self::map_io_error(e, "folder creation failed"))?;
        Ok(folder)
    }

    async fn list_objects(
        &self,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsResult> {
        let root = self.ready()?;
        let prefix = normalize(prefix);

        let mut keys = Self::walk(root).await?;
        if !prefix.is_empty() {
            keys.retain(|key| key.starts_with(&prefix));
        }
        if let Some(max) = max_keys {
            keys.truncate(max);
        }

        Ok(ListObjectsResult { keys })
    }

    async fn copy_object(
        &self,
        from: &str,
        to: &str,
        _metadata: Option<&HashMap<String, String>>,
        replace_metadata: bool,
    ) -> Result<()> {
        if replace_metadata {
            return Err(Error::unsupported(
                "the local backend does not store object metadata",
            ));
        }

        let (source, _) = self.resolve(from)?;
        let (target, _) = self.resolve(to)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io_error(e, "copy failed"))?;
        }

        fs::copy(&source, &target)
            .await
            .map_err(|e| Self::map_io_error(e, "copy failed"))?;
        Ok(())
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<MoveOutcome> {
        let (source, _) = self.resolve(from)?;
        let (target, _) = self.resolve(to)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io_error(e, "move failed"))?;
        }

        // Native rename when the OS allows it; copy-then-delete otherwise
        if fs::rename(&source, &target).await.is_ok() {
            return Ok(MoveOutcome::Completed);
        }

        fs::copy(&source, &target)
            .await
            .map_err(|e| Self::map_io_error(e, "move failed"))?;

        match fs::remove_file(&source).await {
            Ok(()) => Ok(MoveOutcome::Completed),
            Err(e) => {
                warn!(from, to, error = %e, "source delete failed after copy; object exists at both locations");
                Ok(MoveOutcome::SourceRetained {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn validate_credentials(
        &self,
        candidate: &StorageCredentials,
    ) -> Result<ValidationResult> {
        let StorageCredentials::Local(candidate) = candidate else {
            return Ok(ValidationResult::failure(
                ValidationCode::Unknown,
                "credential kind does not match the local provider",
            ));
        };

        let root = Path::new(&candidate.root_path);
        match fs::metadata(root).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Ok(ValidationResult::failure(
                    ValidationCode::BucketNotFound,
                    format!("root path is not a directory: {}", candidate.root_path),
                ));
            }
            Err(_) => {
                return Ok(ValidationResult::failure(
                    ValidationCode::BucketNotFound,
                    format!("root path does not exist: {}", candidate.root_path),
                )
                .with_suggestions(vec!["create the directory first".into()]));
            }
        }

        // Writability probe: create and remove a marker file
        let probe = root.join(format!(".stowage-probe-{}", std::process::id()));
        match fs::write(&probe, b"").await {
            Ok(()) => {
                let _ = fs::remove_file(&probe).await;
                Ok(ValidationResult::ok(
                    format!("root path {} is writable", candidate.root_path),
                    Some(StorageInfo {
                        bucket: Some(candidate.root_path.clone()),
                        region: None,
                        permissions: vec!["read".into(), "write".into()],
                    }),
                ))
            }
            Err(e) => Ok(ValidationResult::failure(
                ValidationCode::InsufficientPermissions,
                format!("root path is not writable: {e}"),
            )
            .with_suggestions(vec![
                "fix directory permissions for the service user".into(),
            ])),
        }
    }

    async fn health_check(&self) -> bool {
        match &self.root {
            Some(root) => fs::metadata(root)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false),
            None => false,
        }
    }
}

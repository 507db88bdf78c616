//! Shared plumbing for object_store-backed providers (GCS, Azure Blob)
//!
//! Both backends speak through the object_store crate; this module holds
//! the store-generic halves of their StorageProvider implementations so
//! gcs.rs and azure.rs only carry backend-specific construction,
//! validation and capability differences.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use object_store::path::Path as StorePath;
use object_store::signer::Signer;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOpts, PutPayload, WriteMultipart,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use stowage_core::{
    Error, ListObjectsResult, MoveOutcome, OperationErrorKind, Result, UploadMetadata,
    UploadResult, ValidationCode, normalize, normalize_key,
};

/// Read chunk size for streaming uploads
const UPLOAD_CHUNK: usize = 1024 * 1024;

/// Cap on queued upload parts awaiting transfer
const UPLOAD_PART_CONCURRENCY: usize = 8;

/// Marker object created inside a new folder. object_store paths cannot
/// carry a trailing slash, so these backends get an explicit marker file
/// instead of a zero-byte "dir/" object.
const FOLDER_MARKER: &str = ".keep";

/// A store that can both perform object operations and sign URLs
pub(crate) trait SignedStore: ObjectStore + Signer {}

impl<T: ObjectStore + Signer> SignedStore for T {}

/// One tenant's bound store plus the naming context for results
pub(crate) struct RemoteStore {
    store: Arc<dyn SignedStore>,
    /// Bucket or container name, for URLs and messages
    scope: String,
    /// URL scheme used in `file_url` results, e.g. "gs"
    scheme: &'static str,
}

impl RemoteStore {
    pub(crate) fn new(
        store: Arc<dyn SignedStore>,
        scope: impl Into<String>,
        scheme: &'static str,
    ) -> Self {
        Self {
            store,
            scope: scope.into(),
            scheme,
        }
    }

    /// Single cheap request proving the store answers for this scope
    pub(crate) async fn probe(&self) -> Result<()> {
        self.probe_raw()
            .await
            .map_err(|e| map_store_error(e, "store probe failed"))
    }

    /// Probe returning the raw store error, for validation-code mapping
    pub(crate) async fn probe_raw(&self) -> std::result::Result<(), object_store::Error> {
        self.store.list_with_delimiter(None).await?;
        Ok(())
    }

    pub(crate) async fn upload_file(
        &self,
        local_path: &Path,
        destination: &str,
        mime_type: Option<&str>,
        metadata: &UploadMetadata,
    ) -> Result<UploadResult> {
        let key = normalize_key(destination);
        let location = StorePath::from(key.as_str());

        let content_type = mime_type.map(str::to_owned).or_else(|| {
            mime_guess::from_path(local_path)
                .first()
                .map(|m| m.essence_str().to_string())
        });

        let object_metadata = metadata.to_map();

        let mut attributes = Attributes::new();
        if let Some(ct) = content_type {
            attributes.insert(Attribute::ContentType, ct.into());
        }
        for (name, value) in &object_metadata {
            attributes.insert(Attribute::Metadata(name.clone().into()), value.clone().into());
        }

        let mut opts = PutMultipartOpts::default();
        opts.attributes = attributes;

        let upload = self
            .store
            .put_multipart_opts(&location, opts)
            .await
            .map_err(|e| map_store_error(e, "upload start failed"))?;

        // Stream from disk in fixed-size chunks with bounded in-flight
        // parts; the file is never fully buffered.
        let mut writer = WriteMultipart::new(upload);
        let mut file = tokio::fs::File::open(local_path).await?;
        let mut buf = vec![0u8; UPLOAD_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer
                .wait_for_capacity(UPLOAD_PART_CONCURRENCY)
                .await
                .map_err(|e| map_store_error(e, "upload part failed"))?;
            writer.write(&buf[..n]);
        }
        writer
            .finish()
            .await
            .map_err(|e| map_store_error(e, "upload finish failed"))?;

        debug!(key = %key, tenant_id = %metadata.tenant_id, "object uploaded");

        Ok(UploadResult {
            file_url: format!("{}://{}/{key}", self.scheme, self.scope),
            full_path: key,
            public_url: None,
            metadata: Some(object_metadata),
        })
    }

    pub(crate) async fn download_url(
        &self,
        path: &str,
        expiry: Duration,
        tenant_id: &str,
    ) -> Result<String> {
        let key = normalize_key(path);
        let location = StorePath::from(key.as_str());

        let url = self
            .store
            .signed_url(http::Method::GET, &location, expiry)
            .await
            .map_err(|e| map_store_error(e, "URL signing failed"))?;

        debug!(key = %key, tenant_id, expiry_secs = expiry.as_secs(), "issued signed download url");
        Ok(url.to_string())
    }

    pub(crate) async fn delete_file(&self, path: &str) -> Result<()> {
        let location = StorePath::from(normalize_key(path).as_str());
        self.store
            .delete(&location)
            .await
            .map_err(|e| map_store_error(e, "delete failed"))
    }

    pub(crate) async fn create_folder(&self, path: &str) -> Result<String> {
        let folder = normalize(path);
        if folder.is_empty() {
            return Err(Error::Configuration(
                "cannot create a folder at the bucket root".into(),
            ));
        }

        let marker = format!("{folder}{FOLDER_MARKER}");
        let location = StorePath::from(marker.as_str());
        self.store
            .put(&location, PutPayload::from_static(&[]))
            .await
            .map_err(|e| map_store_error(e, "folder creation failed"))?;
        Ok(marker)
    }

    pub(crate) async fn list_objects(
        &self,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsResult> {
        let normalized = normalize(prefix);
        let store_prefix =
            (!normalized.is_empty()).then(|| StorePath::from(normalized.trim_end_matches('/')));

        // object_store drains backend pages internally; the stream yields
        // every object under the prefix.
        let mut stream = self.store.list(store_prefix.as_ref());
        let mut keys = Vec::new();
        let mut seen = HashSet::new();

        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| map_store_error(e, "list failed"))?
        {
            let key = meta.location.to_string();
            if seen.insert(key.clone()) {
                keys.push(key);
            }
            if let Some(max) = max_keys {
                if keys.len() >= max {
                    break;
                }
            }
        }

        Ok(ListObjectsResult { keys })
    }

    pub(crate) async fn copy_object(
        &self,
        from: &str,
        to: &str,
        replace_metadata: bool,
    ) -> Result<()> {
        if replace_metadata {
            // object_store server-side copy always carries source metadata.
            return Err(Error::unsupported(
                "metadata replacement during copy is not supported by this backend",
            ));
        }

        let from_location = StorePath::from(normalize_key(from).as_str());
        let to_location = StorePath::from(normalize_key(to).as_str());
        self.store
            .copy(&from_location, &to_location)
            .await
            .map_err(|e| map_store_error(e, "copy failed"))
    }

    pub(crate) async fn move_object(&self, from: &str, to: &str) -> Result<MoveOutcome> {
        self.copy_object(from, to, false).await?;

        match self.delete_file(from).await {
            Ok(()) => Ok(MoveOutcome::Completed),
            Err(e) => {
                warn!(from, to, error = %e, "source delete failed after copy; object exists at both locations");
                Ok(MoveOutcome::SourceRetained {
                    reason: e.to_string(),
                })
            }
        }
    }

    pub(crate) async fn health_check(&self) -> bool {
        self.probe().await.is_ok()
    }
}

/// Map an object_store error into the operation taxonomy
pub(crate) fn map_store_error(err: object_store::Error, context: &str) -> Error {
    let kind = match &err {
        object_store::Error::NotFound { .. } => OperationErrorKind::NotFound,
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => OperationErrorKind::Forbidden,
        object_store::Error::NotSupported { .. } | object_store::Error::NotImplemented => {
            OperationErrorKind::Unsupported
        }
        object_store::Error::Generic { .. } => OperationErrorKind::Network,
        _ => OperationErrorKind::Other,
    };
    Error::operation(kind, format!("{context}: {err}"))
}

/// Map a failed credential probe into a validation sub-code
pub(crate) fn validation_code(err: &object_store::Error) -> ValidationCode {
    match err {
        object_store::Error::NotFound { .. } => ValidationCode::BucketNotFound,
        object_store::Error::Unauthenticated { .. } => ValidationCode::AuthRejected,
        object_store::Error::PermissionDenied { .. } => ValidationCode::InsufficientPermissions,
        object_store::Error::Generic { .. } => ValidationCode::NetworkUnreachable,
        _ => ValidationCode::Unknown,
    }
}

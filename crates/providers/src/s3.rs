//! S3 provider implementation
//!
//! Wraps aws-sdk-s3 and implements the StorageProvider trait from
//! stowage-core. Works against AWS as well as S3-compatible stores via a
//! custom endpoint.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::MetadataDirective;
use tracing::{debug, info, warn};

use stowage_core::{
    Capabilities, Error, ListObjectsResult, MoveOutcome, OperationErrorKind, ProviderKind, Result,
    S3Credentials, StorageCredentials, StorageInfo, StorageProvider, UploadMetadata, UploadResult,
    ValidationCode, ValidationResult, normalize, normalize_key,
    traits::DEFAULT_URL_EXPIRY,
};

/// Page size used when draining paginated listings
const LIST_PAGE_SIZE: i32 = 1000;

/// Drain a paginated listing into one flat, de-duplicated key set.
///
/// `fetch_page` is called with the previous continuation token and returns
/// a page of keys plus the next token; `None` ends the drain. `max_keys`
/// caps the total collected.
async fn drain_pages<F, Fut>(mut fetch_page: F, max_keys: Option<usize>) -> Result<Vec<String>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<String>, Option<String>)>>,
{
    let mut keys = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut token: Option<String> = None;

    loop {
        let (page, next) = fetch_page(token.take()).await?;
        for key in page {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
            if let Some(max) = max_keys {
                if keys.len() >= max {
                    return Ok(keys);
                }
            }
        }

        match next {
            Some(t) => token = Some(t),
            None => break,
        }
    }

    Ok(keys)
}

/// S3-backed storage provider.
///
/// One instance binds one tenant's credentials; construct fresh per
/// request.
pub struct S3Provider {
    client: Option<aws_sdk_s3::Client>,
    bucket: String,
    region: String,
    custom_endpoint: bool,
    url_expiry: Duration,
}

impl S3Provider {
    pub fn new() -> Self {
        Self {
            client: None,
            bucket: String::new(),
            region: String::new(),
            custom_endpoint: false,
            url_expiry: DEFAULT_URL_EXPIRY,
        }
    }

    /// Override the default signed-URL lifetime (test determinism)
    pub fn with_url_expiry(mut self, expiry: Duration) -> Self {
        self.url_expiry = expiry;
        self
    }

    async fn build_client(credentials: &S3Credentials) -> aws_sdk_s3::Client {
        let static_credentials = aws_credential_types::Credentials::new(
            credentials.access_key.clone(),
            credentials.secret_key.clone(),
            None, // session token
            None, // expiry
            "stowage-static-credentials",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(static_credentials)
            .region(aws_config::Region::new(credentials.region.clone()));

        if let Some(endpoint) = &credentials.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(credentials.force_path_style)
            .build();

        aws_sdk_s3::Client::from_conf(s3_config)
    }

    fn ready(&self) -> Result<&aws_sdk_s3::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::Configuration("S3 provider is not initialized".into()))
    }

    /// Map an SDK error into the operation taxonomy; the raw error never
    /// leaves this crate untagged.
    fn map_sdk_error(err: impl std::fmt::Display, context: &str) -> Error {
        let text = err.to_string();
        let kind = if text.contains("NoSuchKey")
            || text.contains("NoSuchBucket")
            || text.contains("NotFound")
        {
            OperationErrorKind::NotFound
        } else if text.contains("AccessDenied") || text.contains("Forbidden") {
            OperationErrorKind::Forbidden
        } else if text.contains("SlowDown") || text.contains("TooManyRequests") {
            OperationErrorKind::Throttled
        } else if text.contains("dispatch failure")
            || text.contains("timed out")
            || text.contains("connection")
        {
            OperationErrorKind::Network
        } else {
            OperationErrorKind::Other
        };
        Error::operation(kind, format!("{context}: {text}"))
    }
}

impl Default for S3Provider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for S3Provider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::S3
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            server_side_copy: true,
            native_move: false,
            signed_urls: true,
            object_metadata: true,
            metadata_replace: true,
        }
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn initialize(&mut self, credentials: StorageCredentials) -> Result<()> {
        let StorageCredentials::S3(credentials) = credentials else {
            return Err(Error::Configuration(format!(
                "expected S3 credentials, got {}",
                credentials.kind()
            )));
        };

        let client = Self::build_client(&credentials).await;

        // Cheap existence probe; the provider only becomes ready when the
        // bucket answers.
        client
            .head_bucket()
            .bucket(&credentials.bucket)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, "bucket probe failed"))?;

        info!(bucket = %credentials.bucket, region = %credentials.region, "s3 provider initialized");
        self.bucket = credentials.bucket;
        self.region = credentials.region;
        self.custom_endpoint = credentials.endpoint.is_some();
        self.client = Some(client);
        Ok(())
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        destination: &str,
        mime_type: Option<&str>,
        metadata: &UploadMetadata,
    ) -> Result<UploadResult> {
        let client = self.ready()?;
        let key = normalize_key(destination);

        // Streams from disk; the file is never fully buffered.
        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            Error::operation(
                OperationErrorKind::Other,
                format!("failed to open upload source: {e}"),
            )
        })?;

        let content_type = mime_type.map(str::to_owned).or_else(|| {
            mime_guess::from_path(local_path)
                .first()
                .map(|m| m.essence_str().to_string())
        });

        let object_metadata = metadata.to_map();

        let mut request = client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        for (name, value) in &object_metadata {
            request = request.metadata(name, value);
        }

        request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, "upload failed"))?;

        debug!(key = %key, tenant_id = %metadata.tenant_id, "object uploaded");

        let public_url = (!self.custom_endpoint).then(|| {
            format!(
                "https://{}.s3.{}.amazonaws.com/{key}",
                self.bucket, self.region
            )
        });

        Ok(UploadResult {
            file_url: format!("s3://{}/{key}", self.bucket),
            full_path: key,
            public_url,
            metadata: Some(object_metadata),
        })
    }

    async fn download_url(
        &self,
        path: &str,
        expires_in: Option<Duration>,
        tenant_id: &str,
    ) -> Result<String> {
        let client = self.ready()?;
        let key = normalize_key(path);
        let expiry = expires_in.unwrap_or(self.url_expiry);

        let presigning = PresigningConfig::expires_in(expiry)
            .map_err(|e| Error::Configuration(format!("invalid URL expiry: {e}")))?;

        let presigned = client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| Self::map_sdk_error(e, "presign failed"))?;

        debug!(key = %key, tenant_id, expiry_secs = expiry.as_secs(), "issued signed download url");
        Ok(presigned.uri().to_string())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let client = self.ready()?;
        let key = normalize_key(path);

        client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, "delete failed"))?;

        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<String> {
        let client = self.ready()?;
        let marker = normalize(path);
        if marker.is_empty() {
            return Err(Error::Configuration(
                "cannot create a folder at the bucket root".into(),
            ));
        }

        // Zero-byte directory-like marker object
        client
            .put_object()
            .bucket(&self.bucket)
            .key(&marker)
            .body(ByteStream::from_static(&[]))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, "folder creation failed"))?;

        Ok(marker)
    }

    async fn list_objects(
        &self,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsResult> {
        let client = self.ready()?.clone();
        let bucket = self.bucket.clone();
        let prefix = normalize(prefix);

        // Drain every page; a single backend page never bounds the result.
        let keys = drain_pages(
            move |token| {
                let client = client.clone();
                let bucket = bucket.clone();
                let prefix = prefix.clone();
                async move {
                    let mut request = client
                        .list_objects_v2()
                        .bucket(&bucket)
                        .max_keys(LIST_PAGE_SIZE);

                    if !prefix.is_empty() {
                        request = request.prefix(&prefix);
                    }

                    if let Some(t) = &token {
                        request = request.continuation_token(t);
                    }

                    let response = request
                        .send()
                        .await
                        .map_err(|e| Self::map_sdk_error(e, "list failed"))?;

                    let page = response
                        .contents()
                        .iter()
                        .filter_map(|object| object.key().map(str::to_owned))
                        .collect();

                    let next = response
                        .is_truncated()
                        .unwrap_or(false)
                        .then(|| response.next_continuation_token().map(str::to_owned))
                        .flatten();

                    Ok((page, next))
                }
            },
            max_keys,
        )
        .await?;

        Ok(ListObjectsResult { keys })
    }

    async fn copy_object(
        &self,
        from: &str,
        to: &str,
        metadata: Option<&HashMap<String, String>>,
        replace_metadata: bool,
    ) -> Result<()> {
        let client = self.ready()?;
        let from_key = normalize_key(from);
        let to_key = normalize_key(to);
        let copy_source = format!("{}/{from_key}", self.bucket);

        let mut request = client
            .copy_object()
            .copy_source(&copy_source)
            .bucket(&self.bucket)
            .key(&to_key);

        if replace_metadata {
            request = request.metadata_directive(MetadataDirective::Replace);
            if let Some(metadata) = metadata {
                for (name, value) in metadata {
                    request = request.metadata(name, value);
                }
            }
        } else {
            request = request.metadata_directive(MetadataDirective::Copy);
        }

        request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, "copy failed"))?;

        Ok(())
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<MoveOutcome> {
        self.copy_object(from, to, None, false).await?;

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

    async fn validate_credentials(
        &self,
        candidate: &StorageCredentials,
    ) -> Result<ValidationResult> {
        let StorageCredentials::S3(candidate) = candidate else {
            return Ok(ValidationResult::failure(
                ValidationCode::Unknown,
                "credential kind does not match the S3 provider",
            ));
        };

        if let Some(endpoint) = &candidate.endpoint {
            if url::Url::parse(endpoint).is_err() {
                return Ok(ValidationResult::failure(
                    ValidationCode::Unknown,
                    format!("endpoint is not a valid URL: {endpoint}"),
                )
                .with_suggestions(vec!["use a full http(s):// endpoint URL".into()]));
            }
        }

        // Cheapest live check with the candidate credentials, not the
        // already-bound ones.
        let client = Self::build_client(candidate).await;
        match client.head_bucket().bucket(&candidate.bucket).send().await {
            Ok(_) => Ok(ValidationResult::ok(
                format!("bucket {} is reachable", candidate.bucket),
                Some(StorageInfo {
                    bucket: Some(candidate.bucket.clone()),
                    region: Some(candidate.region.clone()),
                    permissions: vec!["read".into()],
                }),
            )),
            Err(e) => {
                let text = e.to_string();
                let (code, suggestions) = if text.contains("NoSuchBucket")
                    || text.contains("NotFound")
                {
                    (
                        ValidationCode::BucketNotFound,
                        vec!["check the bucket name and region".into()],
                    )
                } else if text.contains("InvalidAccessKeyId")
                    || text.contains("SignatureDoesNotMatch")
                    || text.contains("AccessDenied")
                {
                    (
                        ValidationCode::AuthRejected,
                        vec!["check the access key and secret".into()],
                    )
                } else if text.contains("Forbidden") {
                    (
                        ValidationCode::InsufficientPermissions,
                        vec!["grant the key read/write access to the bucket".into()],
                    )
                } else if text.contains("dispatch failure") || text.contains("timed out") {
                    (
                        ValidationCode::NetworkUnreachable,
                        vec!["check the endpoint and network connectivity".into()],
                    )
                } else {
                    (ValidationCode::Unknown, Vec::new())
                };

                Ok(
                    ValidationResult::failure(code, format!("credential check failed: {text}"))
                        .with_suggestions(suggestions),
                )
            }
        }
    }

    async fn health_check(&self) -> bool {
        match &self.client {
            Some(client) => client
                .head_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_predicates() {
        let provider = S3Provider::new();
        assert!(!provider.is_configured());
        assert_eq!(provider.kind(), ProviderKind::S3);
        assert!(provider.capabilities().server_side_copy);
        assert!(provider.capabilities().metadata_replace);
    }

    #[tokio::test]
    async fn test_unconfigured_health_check_is_false() {
        let provider = S3Provider::new();
        assert!(!provider.health_check().await);
    }

    #[tokio::test]
    async fn test_operations_require_initialization() {
        let provider = S3Provider::new();
        let err = provider.delete_file("docs/a.txt").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = provider
            .download_url("docs/a.txt", None, "tenant-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_sdk_error_mapping() {
        let err = S3Provider::map_sdk_error("NoSuchKey: the key does not exist", "copy failed");
        assert!(matches!(
            err,
            Error::ProviderOperation {
                kind: OperationErrorKind::NotFound,
                ..
            }
        ));

        let err = S3Provider::map_sdk_error("AccessDenied", "upload failed");
        assert!(matches!(
            err,
            Error::ProviderOperation {
                kind: OperationErrorKind::Forbidden,
                ..
            }
        ));

        let err = S3Provider::map_sdk_error("dispatch failure: connection refused", "list failed");
        assert!(err.is_transient());

        let err = S3Provider::map_sdk_error("something else entirely", "copy failed");
        assert!(matches!(
            err,
            Error::ProviderOperation {
                kind: OperationErrorKind::Other,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_drain_pages_unions_and_dedups() {
        // Three backend pages with one key repeated across a page boundary
        let pages = std::cell::RefCell::new(std::collections::VecDeque::from(vec![
            (
                vec!["a.txt".to_string(), "b.txt".to_string()],
                Some("t1".to_string()),
            ),
            (
                vec!["b.txt".to_string(), "c.txt".to_string()],
                Some("t2".to_string()),
            ),
            (vec!["d.txt".to_string()], None),
        ]));

        let keys = drain_pages(
            |_token| {
                let page = pages.borrow_mut().pop_front().expect("unexpected extra page");
                async move { Ok(page) }
            },
            None,
        )
        .await
        .unwrap();

        assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt", "d.txt"]);
    }

    #[tokio::test]
    async fn test_drain_pages_passes_tokens_and_caps() {
        let tokens_seen = std::cell::RefCell::new(Vec::new());

        let keys = drain_pages(
            |token| {
                tokens_seen.borrow_mut().push(token.clone());
                async move {
                    let next = match token.as_deref() {
                        None => Some("t1".to_string()),
                        Some("t1") => Some("t2".to_string()),
                        _ => None,
                    };
                    let page = (0..3).map(|i| format!("{token:?}/{i}")).collect();
                    Ok((page, next))
                }
            },
            Some(4),
        )
        .await
        .unwrap();

        // Capped after four keys, mid-second-page
        assert_eq!(keys.len(), 4);
        assert_eq!(
            *tokens_seen.borrow(),
            vec![None, Some("t1".to_string())]
        );
    }
}

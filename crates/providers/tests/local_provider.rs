//! End-to-end tests for the local provider wired through the full stack:
//! vault-sealed credentials, config store, resolver, provider operations
//! and the batch coordinator. Runs entirely on a temp directory, no
//! network.

use std::path::PathBuf;

use tempfile::TempDir;

use stowage_core::{
    BatchCoordinator, BatchMapping, BatchOutcome, ConfigStore, CredentialVault, LocalCredentials,
    MasterKey, MoveOutcome, ProviderKind, StorageConfig, StorageCredentials, UploadMetadata,
};
use stowage_providers::ProviderResolver;

fn vault() -> CredentialVault {
    CredentialVault::new(MasterKey::from_bytes([42u8; 32]))
}

fn local_credentials(root: &TempDir) -> StorageCredentials {
    StorageCredentials::Local(LocalCredentials {
        root_path: root.path().to_string_lossy().into_owned(),
    })
}

fn staged_file(staging: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = staging.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn full_stack_roundtrip() {
    let root = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();

    // Seal credentials and persist the tenant config the way the setup
    // flow would.
    let resolver = ProviderResolver::new(vault());
    let sealed = resolver.seal_credentials(&local_credentials(&root)).unwrap();

    let store = ConfigStore::with_path(store_dir.path().join("configs.toml"));
    store
        .set(StorageConfig::new("tenant-1", ProviderKind::Local, sealed))
        .unwrap();

    // Resolve and drive the provider.
    let provider = resolver.resolve_tenant(&store, "tenant-1").await.unwrap();

    let source = staged_file(&staging, "report.pdf", b"quarterly numbers");
    let uploaded = provider
        .upload_file(
            &source,
            "/docs/report.pdf",
            Some("application/pdf"),
            &UploadMetadata::new("tenant-1", "report.pdf"),
        )
        .await
        .unwrap();
    assert_eq!(uploaded.full_path, "docs/report.pdf");

    provider.create_folder("docs/archive").await.unwrap();
    provider
        .copy_object("docs/report.pdf", "docs/archive/report.pdf", None, false)
        .await
        .unwrap();

    let listed = provider.list_objects("docs", None).await.unwrap();
    assert_eq!(
        listed.keys,
        vec!["docs/archive/report.pdf", "docs/report.pdf"]
    );

    let outcome = provider
        .move_object("docs/report.pdf", "docs/current.pdf")
        .await
        .unwrap();
    assert_eq!(outcome, MoveOutcome::Completed);

    let listed = provider.list_objects("docs", None).await.unwrap();
    assert_eq!(listed.keys, vec!["docs/archive/report.pdf", "docs/current.pdf"]);

    assert!(provider.health_check().await);
}

#[tokio::test]
async fn batch_copy_through_local_provider() {
    let root = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();

    let resolver = ProviderResolver::new(vault());
    let sealed = resolver.seal_credentials(&local_credentials(&root)).unwrap();
    let config = StorageConfig::new("tenant-1", ProviderKind::Local, sealed);
    let provider = resolver.resolve(&config).await.unwrap();

    for i in 0..4 {
        let source = staged_file(&staging, &format!("f{i}.txt"), b"payload");
        provider
            .upload_file(
                &source,
                &format!("in/f{i}.txt"),
                None,
                &UploadMetadata::new("tenant-1", "f"),
            )
            .await
            .unwrap();
    }

    // Mapping 2 points at a source that does not exist; the batch must
    // drain anyway.
    let mappings = vec![
        BatchMapping::new("in/f0.txt", "out/f0.txt"),
        BatchMapping::new("in/f1.txt", "out/f1.txt"),
        BatchMapping::new("in/missing.txt", "out/f2.txt"),
        BatchMapping::new("in/f3.txt", "out/f3.txt"),
    ];

    let report = BatchCoordinator::new()
        .concurrency(2)
        .batch_copy(provider.as_ref(), mappings)
        .await;

    assert_eq!(report.items.len(), 4);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.items[2].outcome,
        BatchOutcome::Failed { .. }
    ));

    let listed = provider.list_objects("out", None).await.unwrap();
    assert_eq!(
        listed.keys,
        vec!["out/f0.txt", "out/f1.txt", "out/f3.txt"]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn move_reports_partial_when_source_delete_fails() {
    use std::os::unix::fs::PermissionsExt;

    let root = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();

    let resolver = ProviderResolver::new(vault());
    let sealed = resolver.seal_credentials(&local_credentials(&root)).unwrap();
    let config = StorageConfig::new("tenant-1", ProviderKind::Local, sealed);
    let provider = resolver.resolve(&config).await.unwrap();

    let source = staged_file(&staging, "a.txt", b"data");
    provider
        .upload_file(&source, "locked/a.txt", None, &UploadMetadata::new("t", "a"))
        .await
        .unwrap();
    provider.create_folder("out").await.unwrap();

    // A read-only source directory lets the copy succeed (reads are fine)
    // while both the rename and the source delete fail.
    let locked_dir = root.path().join("locked");
    std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

    let outcome = provider
        .move_object("locked/a.txt", "out/a.txt")
        .await
        .unwrap();

    assert!(matches!(outcome, MoveOutcome::SourceRetained { .. }));

    // The object exists at both locations; nothing was silently lost.
    assert!(root.path().join("locked/a.txt").exists());
    assert!(root.path().join("out/a.txt").exists());

    // Restore permissions so the temp dir can clean up.
    std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn deactivated_tenant_cannot_resolve() {
    let root = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();

    let resolver = ProviderResolver::new(vault());
    let sealed = resolver.seal_credentials(&local_credentials(&root)).unwrap();

    let store = ConfigStore::with_path(store_dir.path().join("configs.toml"));
    store
        .set(StorageConfig::new("tenant-1", ProviderKind::Local, sealed))
        .unwrap();
    store.deactivate("tenant-1").unwrap();

    let result = resolver.resolve_tenant(&store, "tenant-1").await;
    assert!(result.is_err());

    // The record itself survives deactivation.
    assert!(store.get("tenant-1").is_ok());
}

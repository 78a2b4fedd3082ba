//! Integration tests for the file-backed credential store.
//!
//! These tests exercise the full save/load/info/delete lifecycle against a
//! real file in a temporary directory, including the on-disk format other
//! tools rely on.

use bidwarden_core::{
    CredentialStore, FileBackend, ProviderId, StoreError, TokenError, cipher,
};
use tempfile::TempDir;

const KEY: &str = "test-key";

fn file_store(temp_dir: &TempDir) -> CredentialStore<FileBackend> {
    CredentialStore::new(FileBackend::new(temp_dir.path().join("auth").join("tokens.json")))
}

#[tokio::test]
async fn test_full_credential_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let store = file_store(&temp_dir);
    let provider = ProviderId::new("msgraph");

    // 1. Nothing stored yet
    assert!(store.load(&provider, KEY).await.unwrap().is_none());
    assert!(!store.get_info(&provider).await.unwrap().exists);

    // 2. Save creates the file and parent directory
    store
        .save(&provider, "refresh-token-abc123", KEY)
        .await
        .unwrap();
    let path = store.backend().path().to_path_buf();
    assert!(path.exists());

    // 3. Load round-trips
    let loaded = store.load(&provider, KEY).await.unwrap().unwrap();
    assert_eq!(loaded.expose(), "refresh-token-abc123");

    // 4. Info reports metadata only
    let info = store.get_info(&provider).await.unwrap();
    assert!(info.exists);
    assert_eq!(info.plaintext_length, 20);
    assert!(info.last_updated.is_some());
    assert!(info.encrypted_length > 0);

    // 5. Listing includes the provider and skips metadata
    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed.contains_key(&provider));

    // 6. Delete removes it, and a second delete is a no-op
    store.delete(&provider).await.unwrap();
    assert!(store.load(&provider, KEY).await.unwrap().is_none());
    store.delete(&provider).await.unwrap();
}

#[tokio::test]
async fn test_on_disk_format() {
    let temp_dir = TempDir::new().unwrap();
    let store = file_store(&temp_dir);

    store
        .save(&ProviderId::new("autodesk"), "RT-autodesk", KEY)
        .await
        .unwrap();

    let raw = std::fs::read_to_string(store.backend().path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    let entry = &json["autodesk"];
    let blob = entry["encrypted_refresh_token"].as_str().unwrap();
    assert_eq!(entry["token_length"], 11);
    assert!(entry["last_updated"].is_string());
    assert_eq!(json["_metadata"]["version"], "1.0");

    // The blob is decryptable on its own
    assert!(!raw.contains("RT-autodesk"));
    assert_eq!(cipher::decrypt(blob, KEY).unwrap(), "RT-autodesk");
}

#[tokio::test]
async fn test_saves_preserve_other_providers() {
    let temp_dir = TempDir::new().unwrap();
    let store = file_store(&temp_dir);
    let autodesk = ProviderId::new("autodesk");
    let microsoft = ProviderId::new("microsoft");

    store.save(&autodesk, "AD0", KEY).await.unwrap();
    store.save(&microsoft, "MS0", KEY).await.unwrap();
    store.save(&autodesk, "AD1", KEY).await.unwrap();

    assert_eq!(store.load(&autodesk, KEY).await.unwrap().unwrap().expose(), "AD1");
    assert_eq!(store.load(&microsoft, KEY).await.unwrap().unwrap().expose(), "MS0");
}

#[tokio::test]
async fn test_file_is_reopened_by_new_store() {
    let temp_dir = TempDir::new().unwrap();
    let provider = ProviderId::new("autodesk");

    file_store(&temp_dir)
        .save(&provider, "persisted", KEY)
        .await
        .unwrap();

    let reopened = file_store(&temp_dir);
    assert_eq!(
        reopened.load(&provider, KEY).await.unwrap().unwrap().expose(),
        "persisted"
    );
}

#[tokio::test]
async fn test_corrupt_file_is_error_not_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = file_store(&temp_dir);
    let path = store.backend().path().to_path_buf();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    let result = store.load(&ProviderId::new("autodesk"), KEY).await;
    assert!(matches!(result, Err(StoreError::Corrupt { .. })));

    // Saving over a corrupt file refuses rather than discarding it.
    assert!(store.save(&ProviderId::new("autodesk"), "RT", KEY).await.is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_wrong_key_is_decryption_error() {
    let temp_dir = TempDir::new().unwrap();
    let store = file_store(&temp_dir);
    let provider = ProviderId::new("autodesk");

    store.save(&provider, "RT", KEY).await.unwrap();

    let err = store.load(&provider, "other-key").await.unwrap_err();
    assert!(matches!(err, StoreError::Decryption { .. }));
    assert!(matches!(TokenError::from(err), TokenError::Decryption { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_credential_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let store = file_store(&temp_dir);
    store.save(&ProviderId::new("autodesk"), "RT", KEY).await.unwrap();

    let mode = std::fs::metadata(store.backend().path())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

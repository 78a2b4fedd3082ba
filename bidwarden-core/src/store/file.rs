//! JSON file storage backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{StorageBackend, StoreError};

/// File permissions for the credential file (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Credential document stored as a single JSON file.
///
/// Writes go to a sibling `*.tmp` file which is flushed and then renamed over
/// the destination, so readers see either the old or the new document and
/// never a truncated one.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Create a backend for the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `tokens.json` in the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bidwarden", "bidwarden")
            .map(|dirs| dirs.data_dir().join("tokens.json"))
    }

    /// Path of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tokens.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            location: self.location(),
            source,
        }
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Credential file {} does not exist yet", self.path.display());
                Ok(None)
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn write(&self, contents: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let temp_path = self.temp_path();
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        let mut file = options
            .open(&temp_path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(self.io_error(e));
        }

        tracing::debug!("Wrote credential file {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderId;
    use crate::store::CredentialStore;
    use tempfile::TempDir;

    fn test_store() -> (CredentialStore<FileBackend>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth").join("tokens.json");
        (CredentialStore::new(FileBackend::new(path)), temp_dir)
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let (store, _temp) = test_store();
        assert!(store.backend().read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parent_and_leaves_no_temp_file() {
        let (store, _temp) = test_store();
        store
            .save(&ProviderId::new("autodesk"), "token", "k")
            .await
            .unwrap();

        let path = store.backend().path().to_path_buf();
        assert!(path.exists());
        assert!(!store.backend().temp_path().exists());
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokens.json");
        let provider = ProviderId::new("microsoft");

        {
            let store = CredentialStore::new(FileBackend::new(&path));
            store.save(&provider, "persisted-token", "k").await.unwrap();
        }

        {
            let store = CredentialStore::new(FileBackend::new(&path));
            let loaded = store.load(&provider, "k").await.unwrap().unwrap();
            assert_eq!(loaded.expose(), "persisted-token");
        }
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let backend = FileBackend::new("/var/lib/bidwarden/tokens.json");
        assert_eq!(
            backend.temp_path(),
            PathBuf::from("/var/lib/bidwarden/tokens.json.tmp")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _temp) = test_store();
        store
            .save(&ProviderId::new("autodesk"), "token", "k")
            .await
            .unwrap();

        let mode = std::fs::metadata(store.backend().path())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[tokio::test]
    async fn test_write_failure_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = temp_dir.path().join("tokens.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let store = CredentialStore::new(FileBackend::new(&path));
        let result = store.save(&ProviderId::new("autodesk"), "token", "k").await;
        assert!(result.is_err());
    }
}

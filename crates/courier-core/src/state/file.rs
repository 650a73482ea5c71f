// # File Identity Store
//
// File-based implementation of IdentityStore with crash recovery.
//
// ## Purpose
//
// Persists the device identifier across daemon restarts and crashes so one
// installation keeps one identity.
//
// ## Crash Recovery
//
// - Atomic writes: new content goes to a temporary file, then rename
// - Corruption detection: JSON validated on load
// - Automatic backup: last known good content kept in a `.backup` file
// - Recovery: falls back to the backup if corruption is detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "device_id": "0a1b2c3d-..."
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::record::DeviceIdentity;
use crate::traits::IdentityStore;

/// Identity file format version
/// Used for future migration if the format changes
const IDENTITY_FILE_VERSION: &str = "1.0";

/// Serializable identity file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct IdentityFileFormat {
    version: String,
    device_id: String,
}

/// File-based identity store with crash recovery
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Create a store over the given path
    ///
    /// Creates the parent directory if needed. The file itself is created on
    /// the first `store` call.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::identity(format!(
                    "failed to create identity directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self { path })
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.as_os_str().to_os_string();
        backup.push(".backup");
        PathBuf::from(backup)
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.as_os_str().to_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    /// Read and parse one identity file
    async fn read_file(path: &Path) -> Result<Option<DeviceIdentity>, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::identity(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let parsed: IdentityFileFormat = serde_json::from_str(&content)
            .map_err(|e| Error::identity(format!("corrupt identity file: {}", e)))?;

        if parsed.device_id.is_empty() {
            return Err(Error::identity("identity file holds an empty identifier"));
        }

        Ok(Some(DeviceIdentity::new(parsed.device_id)))
    }

    /// Load with automatic recovery from the backup file
    async fn load_with_recovery(&self) -> Result<Option<DeviceIdentity>, Error> {
        match Self::read_file(&self.path).await {
            Ok(identity) => Ok(identity),
            Err(e) => {
                tracing::warn!(
                    "identity file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup = Self::backup_path(&self.path);
                match Self::read_file(&backup).await {
                    Ok(Some(identity)) => {
                        tracing::info!("recovered device identity from backup");
                        Ok(Some(identity))
                    }
                    Ok(None) => {
                        tracing::warn!("no backup file found, treating identity as unset");
                        Ok(None)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "backup also unreadable: {}. Treating identity as unset.",
                            backup_err
                        );
                        Ok(None)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> Result<Option<DeviceIdentity>, Error> {
        self.load_with_recovery().await
    }

    async fn store(&self, identity: &DeviceIdentity) -> Result<(), Error> {
        let format = IdentityFileFormat {
            version: IDENTITY_FILE_VERSION.to_string(),
            device_id: identity.as_str().to_string(),
        };
        let content = serde_json::to_string_pretty(&format)?;

        // Keep the previous good file as backup before replacing it.
        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let backup = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup).await {
                tracing::warn!("failed to write identity backup: {}", e);
            }
        }

        // Write-then-rename so a kill mid-write never corrupts the store.
        let temp = Self::temp_path(&self.path);
        let mut file = fs::File::create(&temp).await.map_err(|e| {
            Error::identity(format!("failed to create {}: {}", temp.display(), e))
        })?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::identity(format!("failed to write identity file: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::identity(format!("failed to sync identity file: {}", e)))?;
        drop(file);

        fs::rename(&temp, &self.path).await.map_err(|e| {
            Error::identity(format!(
                "failed to move identity file into place: {}",
                e
            ))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_on_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("identity.json"))
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_then_load_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let identity = DeviceIdentity::generate();
        {
            let store = FileIdentityStore::new(&path).await.unwrap();
            store.store(&identity).await.unwrap();
        }

        // Fresh store over the same path simulates a process restart.
        let store = FileIdentityStore::new(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn corrupt_file_recovers_from_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let store = FileIdentityStore::new(&path).await.unwrap();

        let identity = DeviceIdentity::generate();
        store.store(&identity).await.unwrap();
        // Second store creates the backup from the first good file.
        store.store(&identity).await.unwrap();

        fs::write(&path, "{ not json").await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn corrupt_file_without_backup_is_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let store = FileIdentityStore::new(&path).await.unwrap();

        fs::write(&path, "garbage").await.unwrap();

        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/identity.json");

        let store = FileIdentityStore::new(&path).await.unwrap();
        store.store(&DeviceIdentity::generate()).await.unwrap();
        assert!(store.load().await.unwrap().is_some());
    }
}

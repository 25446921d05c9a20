//! Local-disk storage for uploaded sheet images.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::core::config::Settings;

#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    root: PathBuf,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> Result<Self> {
        let root = PathBuf::from(settings.storage().upload_dir.clone());
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    /// Writes sheet bytes under `key` and returns the stored size in bytes.
    pub(crate) async fn save(&self, key: &str, bytes: &[u8]) -> Result<i64> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(bytes.len() as i64)
    }

    pub(crate) async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    pub(crate) async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(anyhow::anyhow!(err).context(format!("Failed to delete {}", path.display())))
            }
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        // Keys are generated server-side, but reject traversal anyway.
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative.components().any(|part| {
                matches!(part, std::path::Component::ParentDir | std::path::Component::RootDir)
            })
        {
            anyhow::bail!("Invalid storage key: {key}");
        }
        Ok(self.root.join(relative))
    }
}

/// Storage key for a sheet image, scoped by exam so per-exam cleanup is a
/// single directory removal.
pub(crate) fn sheet_key(exam_id: &str, sheet_id: &str, filename: &str) -> String {
    format!("sheets/{exam_id}/{sheet_id}_{filename}")
}

pub(crate) fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> StorageService {
        let root =
            std::env::temp_dir().join(format!("gridmark-storage-{}", uuid::Uuid::new_v4()));
        StorageService { root }
    }

    #[tokio::test]
    async fn save_and_read_round_trip() {
        let storage = temp_storage();
        let key = sheet_key("exam-1", "sheet-1", "scan.png");

        let size = storage.save(&key, b"fake image bytes").await.expect("save");
        assert_eq!(size, 16);

        let bytes = storage.read(&key).await.expect("read");
        assert_eq!(bytes, b"fake image bytes");

        storage.delete(&key).await.expect("delete");
        assert!(storage.read(&key).await.is_err());
    }

    #[tokio::test]
    async fn delete_missing_key_is_ok() {
        let storage = temp_storage();
        storage.delete("sheets/none/missing.png").await.expect("delete");
    }

    #[test]
    fn resolve_rejects_traversal() {
        let storage = temp_storage();
        assert!(storage.resolve("../etc/passwd").is_err());
        assert!(storage.resolve("/etc/passwd").is_err());
        assert!(storage.resolve("sheets/../../oops").is_err());
        assert!(storage.resolve("sheets/exam/file.png").is_ok());
    }

    #[test]
    fn file_hash_is_stable_sha256() {
        assert_eq!(
            file_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}

//! File-system artifact store
//!
//! Blobs live flat in one directory, each file named by its SHA-256 checksum.
//! Content addressing makes `put` idempotent; `get` re-hashes what it reads
//! and refuses to return a blob that no longer matches its name.

use crate::domain::model::{ArtifactRef, checksum_of};
use crate::domain::repositories::ArtifactStore;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create artifact directory {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, checksum: &str) -> Result<PathBuf> {
        if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("Invalid artifact checksum: {}", checksum);
        }
        Ok(self.root.join(format!("{}.bin", checksum)))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, blob: &[u8]) -> Result<ArtifactRef> {
        let reference = ArtifactRef::for_blob(blob);
        let path = self.path_for(&reference.checksum)?;
        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Artifact {} already stored", reference.checksum);
            return Ok(reference);
        }

        // Write then rename so a crash never leaves a half-written blob under its final name.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, blob)
            .await
            .with_context(|| format!("Failed to write artifact {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move artifact into {}", path.display()))?;

        debug!("Stored artifact {} ({} bytes)", reference.checksum, reference.size_bytes);
        Ok(reference)
    }

    async fn get(&self, checksum: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(checksum)?;
        let blob = match fs::read(&path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read artifact {}", path.display()));
            }
        };

        let actual = checksum_of(&blob);
        if actual != checksum {
            warn!("Artifact {} is corrupt on disk (hash {})", checksum, actual);
            bail!("Artifact {} failed checksum verification", checksum);
        }
        Ok(Some(blob))
    }

    async fn delete(&self, checksum: &str) -> Result<bool> {
        let path = self.path_for(checksum)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete artifact {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("artifact-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let root = temp_root();
        let store = FsArtifactStore::new(&root).await.unwrap();

        let reference = store.put(b"fitted model").await.unwrap();
        assert_eq!(reference.size_bytes, 12);
        // idempotent
        assert_eq!(store.put(b"fitted model").await.unwrap(), reference);

        let blob = store.get(&reference.checksum).await.unwrap().unwrap();
        assert_eq!(blob, b"fitted model");

        assert!(store.delete(&reference.checksum).await.unwrap());
        assert!(!store.delete(&reference.checksum).await.unwrap());
        assert!(store.get(&reference.checksum).await.unwrap().is_none());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_rejected() {
        let root = temp_root();
        let store = FsArtifactStore::new(&root).await.unwrap();
        let reference = store.put(b"original").await.unwrap();

        fs::write(store.path_for(&reference.checksum).unwrap(), b"tampered")
            .await
            .unwrap();
        assert!(store.get(&reference.checksum).await.is_err());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_rejects_path_like_checksums() {
        let store = FsArtifactStore::new(temp_root()).await.unwrap();
        assert!(store.get("../etc/passwd").await.is_err());
    }
}

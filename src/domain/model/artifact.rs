use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content address of an artifact blob: lowercase hex SHA-256.
pub fn checksum_of(blob: &[u8]) -> String {
    hex::encode(Sha256::digest(blob))
}

/// Reference to a stored artifact blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub checksum: String,
    pub size_bytes: usize,
}

impl ArtifactRef {
    pub fn for_blob(blob: &[u8]) -> Self {
        Self {
            checksum: checksum_of(blob),
            size_bytes: blob.len(),
        }
    }
}

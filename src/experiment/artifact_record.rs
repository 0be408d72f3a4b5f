//! Artifact Record - content-addressed trial outputs

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Result;

/// Artifact Record represents a file logged by a run, usually the checkpoint.
///
/// The `cas_hash` has the form `sha256:<hex digest>` and identifies the
/// artifact content independently of where it was written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    key: String,
    cas_hash: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a new artifact record.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `key` - Artifact name/key (e.g., "ckpt.pt")
    /// * `cas_hash` - Content-addressable hash (e.g., "sha256:abc123")
    /// * `size_bytes` - Size of the artifact in bytes
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        key: impl Into<String>,
        cas_hash: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            cas_hash: cas_hash.into(),
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Hash the bytes of `content` and describe them as artifact `key`.
    #[must_use]
    pub fn from_bytes(run_id: impl Into<String>, key: impl Into<String>, content: &[u8]) -> Self {
        Self::new(run_id, key, cas_hash(content), content.len() as u64)
    }

    /// Read and hash a file. The key is the file name.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn from_file(run_id: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        let key = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::from_bytes(run_id, key, &content))
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the artifact key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the content-addressable hash.
    #[must_use]
    pub fn cas_hash(&self) -> &str {
        &self.cas_hash
    }

    /// Get the artifact size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn cas_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256:{hex}")
}

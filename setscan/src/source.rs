//! Source recording identity
//!
//! Calculates a SHA-256 hash of the full file content once per run. Every chunk
//! key derives from it, so cache entries survive file moves and renames and
//! are shared by identical copies.

use sha2::{Digest, Sha256};
use setscan_common::{Error, Result};
use std::path::{Path, PathBuf};

/// A source audio file together with its content hash
#[derive(Debug, Clone)]
pub struct SourceAudio {
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the file content
    pub content_hash: String,
}

impl SourceAudio {
    /// Hash the file at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let content_hash = hash_file(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            content_hash,
        })
    }

    /// File name used in report rows
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Calculate SHA-256 hash of file content
///
/// **Algorithm:**
/// 1. Read file content in chunks (1MB at a time for memory efficiency)
/// 2. Calculate SHA-256 hash
/// 3. Return hex-encoded hash string
pub async fn hash_file(file_path: &Path) -> Result<String> {
    let path_buf = file_path.to_path_buf();
    tracing::debug!(path = %path_buf.display(), "Calculating SHA-256 hash");

    // Hashing a multi-hour recording is CPU and disk bound
    let file_path_clone = path_buf.clone();
    let hash = tokio::task::spawn_blocking(move || -> Result<String> {
        use std::fs::File;
        use std::io::Read;

        let mut file = File::open(&file_path_clone).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open {} for hashing: {}", file_path_clone.display(), e),
            ))
        })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 1024 * 1024];

        loop {
            let bytes_read = file.read(&mut buffer).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read file for hashing: {}", e),
                ))
            })?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| Error::Internal(format!("Hash calculation task failed: {}", e)))??;

    tracing::debug!(path = %path_buf.display(), hash = %hash, "Calculated hash");

    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_known_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.bin");
        std::fs::write(&path, b"abc").unwrap();

        let hash = hash_file(&path).await.unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_hash_ignores_path() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("set.mp3");
        let b = dir.path().join("renamed").join("copy.mp3");
        std::fs::create_dir_all(b.parent().unwrap()).unwrap();
        std::fs::write(&a, vec![7u8; 3 * 1024 * 1024 + 17]).unwrap();
        std::fs::copy(&a, &b).unwrap();

        let sa = SourceAudio::open(&a).await.unwrap();
        let sb = SourceAudio::open(&b).await.unwrap();
        assert_eq!(sa.content_hash, sb.content_hash);
        assert_eq!(sb.file_name(), "copy.mp3");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let result = hash_file(Path::new("/nonexistent/set.mp3")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

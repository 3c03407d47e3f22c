//! Source references and content fingerprints
//!
//! A fingerprint is a hash of (resolved path, byte size, modification time).
//! It is recomputed on every request and stands in for content identity as a
//! cache key. An in-place rewrite that keeps size and modification time
//! (sub-resolution mtime) aliases the old fingerprint; that risk is accepted.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hex characters kept from the SHA-256 digest
const FINGERPRINT_LEN: usize = 32;

/// A source audio file plus its fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    /// Path as given by the caller
    pub path: PathBuf,
    /// Canonicalized path
    pub resolved: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub fingerprint: String,
}

impl SourceRef {
    /// Stat the file and compute its fingerprint
    pub fn open(path: &Path) -> Result<Self> {
        let resolved = std::fs::canonicalize(path)?;
        let metadata = std::fs::metadata(&resolved)?;
        let modified = metadata.modified()?;
        let size = metadata.len();
        let fingerprint = fingerprint(&resolved, size, modified);

        Ok(Self {
            path: path.to_path_buf(),
            resolved,
            size,
            modified,
            fingerprint,
        })
    }
}

/// Hash (resolved path, size, mtime) into a short hex key
pub fn fingerprint(resolved: &Path, size: u64, modified: SystemTime) -> String {
    let mtime_nanos = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(resolved.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(size.to_le_bytes());
    hasher.update(mtime_nanos.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fingerprint_stable_for_unchanged_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.wav");
        std::fs::write(&path, b"RIFF....").unwrap();

        let first = SourceRef::open(&path).unwrap();
        let second = SourceRef::open(&path).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.fingerprint.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_fingerprint_changes_with_size() {
        let p = Path::new("/media/a.wav");
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_ne!(fingerprint(p, 100, t), fingerprint(p, 101, t));
    }

    #[test]
    fn test_fingerprint_changes_with_mtime() {
        let p = Path::new("/media/a.wav");
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_ne!(
            fingerprint(p, 100, t),
            fingerprint(p, 100, t + Duration::from_millis(1))
        );
    }

    #[test]
    fn test_fingerprint_changes_with_path() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_ne!(
            fingerprint(Path::new("/media/a.wav"), 100, t),
            fingerprint(Path::new("/media/b.wav"), 100, t)
        );
    }

    #[test]
    fn test_fingerprint_changes_when_file_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.wav");
        std::fs::write(&path, b"short").unwrap();
        let before = SourceRef::open(&path).unwrap();

        std::fs::write(&path, b"a longer body").unwrap();
        let after = SourceRef::open(&path).unwrap();
        assert_ne!(before.fingerprint, after.fingerprint);
    }

    #[test]
    fn test_open_missing_file_is_error() {
        assert!(SourceRef::open(Path::new("/no/such/file.wav")).is_err());
    }
}

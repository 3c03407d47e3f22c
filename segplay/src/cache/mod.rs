//! On-disk caches
//!
//! - `decode_cache`: one canonical PCM copy per source fingerprint
//! - `clip_cache`: LRU index of sliced, ready-to-play clips
//!
//! Neither cache locks across processes. Eviction is best-effort file
//! deletion, so racing instances at worst rewrite a file.

pub mod clip_cache;
pub mod decode_cache;

pub use clip_cache::{ClipCache, ClipKey};
pub use decode_cache::{DecodeCache, DecodeCacheStats};

use segplay_common::time::{cutoff_days_ago, system_time_to_utc};
use std::path::Path;
use tracing::{debug, warn};

/// Delete `path`, logging anything but "already gone"
///
/// Returns true once the file no longer exists.
pub(crate) fn remove_file_logged(path: &Path, what: &str) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed {what}");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not remove {what}");
            false
        }
    }
}

/// Delete regular files in `dir` older than `max_age_days` unless `skip` vetoes them
///
/// Returns the number of files removed. A missing directory removes nothing.
pub(crate) fn sweep_older_than<F>(dir: &Path, max_age_days: u32, mut skip: F) -> usize
where
    F: FnMut(&Path) -> bool,
{
    let cutoff = cutoff_days_ago(max_age_days);
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Nothing to sweep");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() || skip(&path) {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if system_time_to_utc(modified) >= cutoff {
            continue;
        }
        if remove_file_logged(&path, "cache file") {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_file_logged() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.wav");
        std::fs::write(&file, b"x").unwrap();

        assert!(remove_file_logged(&file, "clip"));
        assert!(!file.exists());
        // Already gone counts as removed
        assert!(remove_file_logged(&file, "clip"));

        // A directory cannot be removed as a file
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        assert!(!remove_file_logged(&sub, "clip"));
        assert!(sub.exists());
    }
}

//! Clip LRU cache
//!
//! Indexes sliced clips by request parameters. The index is access-ordered
//! and capacity-bounded; every entry it drops takes its backing file with
//! it. Entries whose file vanished out-of-band heal on the next lookup.

use lru::LruCache;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Composite clip key. All times are whole milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipKey {
    pub fingerprint: String,
    pub start_ms: u64,
    pub duration_ms: u64,
    pub pad_before_ms: u64,
    pub pad_after_ms: u64,
}

impl ClipKey {
    pub fn new(
        fingerprint: impl Into<String>,
        start_ms: u64,
        duration_ms: u64,
        pad_before_ms: u64,
        pad_after_ms: u64,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            start_ms,
            duration_ms,
            pad_before_ms,
            pad_after_ms,
        }
    }

    /// Deterministic file name for this clip
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}.wav",
            self.fingerprint, self.start_ms, self.duration_ms, self.pad_before_ms, self.pad_after_ms
        )
    }
}

pub struct ClipCache {
    dir: PathBuf,
    max_size: usize,
    entries: LruCache<ClipKey, PathBuf>,
}

impl ClipCache {
    /// Create the cache, creating `dir` if needed
    ///
    /// A capacity of zero is raised to one.
    pub fn new(dir: impl Into<PathBuf>, max_size: usize) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_size: max_size.max(1),
            entries: LruCache::unbounded(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a clip for `key` should be written
    pub fn path_for(&self, key: &ClipKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Indexed, without promoting
    pub fn contains(&self, key: &ClipKey) -> bool {
        self.entries.contains(key)
    }

    /// Clip path if indexed and still on disk; promotes to most-recently-used
    pub fn get(&mut self, key: &ClipKey) -> Option<PathBuf> {
        let path = self.entries.get(key)?.clone();
        if path.is_file() {
            return Some(path);
        }
        debug!(path = %path.display(), "Clip vanished from disk, dropping index entry");
        self.entries.pop(key);
        None
    }

    /// Insert or promote, then evict least-recently-used entries over capacity
    pub fn put(&mut self, key: ClipKey, path: PathBuf) {
        if let Some(previous) = self.entries.put(key, path.clone()) {
            if previous != path {
                remove_clip(&previous);
            }
        }

        while self.entries.len() > self.max_size {
            let Some((evicted_key, evicted_path)) = self.entries.pop_lru() else {
                break;
            };
            debug!(clip = %evicted_key.file_name(), "Evicting clip");
            remove_clip(&evicted_path);
        }
    }

    /// Drop one entry and its file
    pub fn remove(&mut self, key: &ClipKey) -> bool {
        match self.entries.pop(key) {
            Some(path) => {
                remove_clip(&path);
                true
            }
            None => false,
        }
    }

    /// Delete every indexed file and empty the index
    pub fn clear(&mut self) {
        while let Some((_, path)) = self.entries.pop_lru() {
            remove_clip(&path);
        }
    }

    /// Delete old clip files on disk that the index does not know about
    pub fn prune_orphans(&self, max_age_days: u32) -> usize {
        let indexed: HashSet<&Path> = self.entries.iter().map(|(_, p)| p.as_path()).collect();
        super::sweep_older_than(&self.dir, max_age_days, |path| indexed.contains(path))
    }
}

fn remove_clip(path: &Path) {
    super::remove_file_logged(path, "clip");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn key(start_ms: u64) -> ClipKey {
        ClipKey::new("abc123", start_ms, 400, 0, 0)
    }

    fn put_file(cache: &mut ClipCache, k: ClipKey) -> PathBuf {
        let path = cache.path_for(&k);
        std::fs::write(&path, b"clip").unwrap();
        cache.put(k, path.clone());
        path
    }

    #[test]
    fn test_file_name_is_deterministic() {
        let k = ClipKey::new("ff00", 9600, 400, 100, 250);
        assert_eq!(k.file_name(), "ff00_9600_400_100_250.wav");
    }

    #[test]
    fn test_get_promotes_and_put_evicts_lru_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ClipCache::new(dir.path(), 2).unwrap();

        let a = put_file(&mut cache, key(0));
        let b = put_file(&mut cache, key(1000));
        // a becomes most recently used
        assert_eq!(cache.get(&key(0)), Some(a.clone()));

        let c = put_file(&mut cache, key(2000));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(1000)));
        assert!(!b.exists());
        assert!(a.exists());
        assert!(c.exists());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ClipCache::new(dir.path(), 3).unwrap();
        for n in 0..10 {
            put_file(&mut cache, key(n * 100));
            assert!(cache.len() <= 3);
        }
        let on_disk = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(on_disk, 3);
    }

    #[test]
    fn test_missing_file_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ClipCache::new(dir.path(), 5).unwrap();
        let path = put_file(&mut cache, key(0));
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cache.get(&key(0)), None);
        assert!(!cache.contains(&key(0)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replacing_path_deletes_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ClipCache::new(dir.path(), 5).unwrap();
        let old = dir.path().join("old.wav");
        let new = dir.path().join("new.wav");
        std::fs::write(&old, b"1").unwrap();
        std::fs::write(&new, b"2").unwrap();

        cache.put(key(0), old.clone());
        cache.put(key(0), new.clone());
        assert!(!old.exists());
        assert_eq!(cache.get(&key(0)), Some(new));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_clear_delete_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ClipCache::new(dir.path(), 5).unwrap();
        let a = put_file(&mut cache, key(0));
        let b = put_file(&mut cache, key(1));

        assert!(cache.remove(&key(0)));
        assert!(!cache.remove(&key(0)));
        assert!(!a.exists());

        cache.clear();
        assert!(cache.is_empty());
        assert!(!b.exists());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ClipCache::new(dir.path(), 0).unwrap();
        assert_eq!(cache.capacity(), 1);
        put_file(&mut cache, key(0));
        put_file(&mut cache, key(1));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(1)));
    }

    #[test]
    fn test_prune_orphans_spares_indexed_clips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ClipCache::new(dir.path(), 5).unwrap();
        let indexed = put_file(&mut cache, key(0));
        let orphan = dir.path().join("orphan.wav");
        std::fs::write(&orphan, b"x").unwrap();

        let old = SystemTime::now() - Duration::from_secs(3 * 86_400);
        for path in [&indexed, &orphan] {
            std::fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(old)
                .unwrap();
        }

        assert_eq!(cache.prune_orphans(1), 1);
        assert!(indexed.exists());
        assert!(!orphan.exists());
    }
}

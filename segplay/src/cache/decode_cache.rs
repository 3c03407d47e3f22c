//! Decode cache
//!
//! Transcodes each source once into the canonical PCM format (mono, 16 kHz,
//! 16-bit signed little-endian WAV) and reuses that copy for every later
//! slice. An entry is valid while its file exists and is no older than the
//! source. Failures are "PCM unavailable", never fatal.

use crate::audio::{CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
use crate::error::{Error, Result};
use crate::source::SourceRef;
use crate::tools::{Tool, ToolResolver};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const PCM_EXTENSION: &str = "wav";
const PARTIAL_SUFFIX: &str = ".part";

/// Hit/miss counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeCacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct DecodeCache {
    dir: PathBuf,
    tools: Arc<ToolResolver>,
    timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecodeCache {
    pub fn new(dir: impl Into<PathBuf>, tools: Arc<ToolResolver>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            tools,
            timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for a fingerprint
    pub fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.{PCM_EXTENSION}"))
    }

    pub fn stats(&self) -> DecodeCacheStats {
        DecodeCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Canonical PCM path for `path`, transcoding on first use
    pub async fn get_or_create(&self, path: &Path) -> Option<PathBuf> {
        match SourceRef::open(path) {
            Ok(source) => self.get_or_create_for(&source).await,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot fingerprint source");
                None
            }
        }
    }

    /// Canonical PCM path for an already fingerprinted source
    pub async fn get_or_create_for(&self, source: &SourceRef) -> Option<PathBuf> {
        let target = self.path_for(&source.fingerprint);

        if is_fresh(&target, source) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(pcm = %target.display(), "Decode cache hit");
            return Some(target);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.transcode(&source.resolved, &target).await {
            Ok(()) => {
                info!(
                    source = %source.resolved.display(),
                    pcm = %target.display(),
                    "Created canonical PCM copy"
                );
                Some(target)
            }
            Err(e) => {
                warn!(source = %source.resolved.display(), error = %e, "Decode failed");
                None
            }
        }
    }

    async fn transcode(&self, source: &Path, target: &Path) -> Result<()> {
        let transcoder = self.tools.require(Tool::Transcoder)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut partial = target.as_os_str().to_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        let result = self.run_transcoder(&transcoder, source, &partial).await;
        if let Err(e) = result {
            remove_quietly(&partial);
            return Err(e);
        }

        let size = std::fs::metadata(&partial).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            remove_quietly(&partial);
            return Err(Error::Transcode("transcoder produced no output".to_string()));
        }

        std::fs::rename(&partial, target).map_err(|e| {
            remove_quietly(&partial);
            Error::Io(e)
        })
    }

    async fn run_transcoder(&self, transcoder: &Path, source: &Path, out: &Path) -> Result<()> {
        let mut command = Command::new(transcoder);
        command
            .args(["-y", "-v", "error", "-nostdin", "-i"])
            .arg(source)
            .args(["-vn", "-sn", "-dn"])
            .arg("-ac")
            .arg(CANONICAL_CHANNELS.to_string())
            .arg("-ar")
            .arg(CANONICAL_SAMPLE_RATE.to_string())
            .args(["-acodec", "pcm_s16le", "-f", "wav"])
            .arg(out)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Transcode(format!("timed out after {:?}", self.timeout)))??;

        if !output.status.success() {
            let stderr = crate::player::process::shorten_diagnostic(&output.stderr);
            return Err(Error::Transcode(format!("{}: {stderr}", output.status)));
        }
        Ok(())
    }

    /// Delete cache files older than `max_age_days`; returns the count removed
    pub fn cleanup_old_caches(&self, max_age_days: u32) -> usize {
        let removed = super::sweep_older_than(&self.dir, max_age_days, |_| false);
        if removed > 0 {
            info!(removed, dir = %self.dir.display(), "Swept old decode cache files");
        }
        removed
    }
}

/// Exists and was written no earlier than the source's last change
fn is_fresh(cached: &Path, source: &SourceRef) -> bool {
    match std::fs::metadata(cached).and_then(|m| m.modified()) {
        Ok(cached_mtime) => cached_mtime >= source.modified,
        Err(_) => false,
    }
}

fn remove_quietly(path: &Path) {
    super::remove_file_logged(path, "partial output");
}

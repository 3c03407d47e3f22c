//! Stand-ins for external tools and engine seams

use segplay::audio::{SegmentSlicer, WavSlicer};
use segplay::player::{ClipPlayer, OneShotProcess};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Write an executable `/bin/sh` script
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Transcoder that "decodes" by copying `fixture` to its last argument
pub fn fake_transcoder(dir: &Path, fixture: &Path) -> PathBuf {
    script(
        dir,
        "fake-ffmpeg",
        &format!(
            "for last; do :; done\ncp '{}' \"$last\"",
            fixture.display()
        ),
    )
}

/// Seek player that records its arguments to `args_file` and keeps playing
pub fn fake_seek_player(dir: &Path, args_file: &Path) -> PathBuf {
    script(
        dir,
        "fake-ffplay",
        &format!("echo \"$@\" > '{}'\nexec sleep 5", args_file.display()),
    )
}

/// Clip player that records each path and "plays" for a few seconds
#[derive(Default)]
pub struct RecordingClipPlayer {
    played: Mutex<Vec<PathBuf>>,
}

impl RecordingClipPlayer {
    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().unwrap().clone()
    }
}

impl ClipPlayer for RecordingClipPlayer {
    fn play(&self, path: &Path) -> segplay::Result<OneShotProcess> {
        self.played.lock().unwrap().push(path.to_path_buf());
        OneShotProcess::spawn(Path::new("/bin/sh"), ["-c", "exec sleep 5"], "recording")
    }
}

/// Slicer spy counting calls
#[derive(Default)]
pub struct CountingSlicer {
    inner: WavSlicer,
    calls: AtomicUsize,
}

impl CountingSlicer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SegmentSlicer for CountingSlicer {
    fn slice(&self, pcm: &Path, start_secs: f64, duration_secs: f64, out: &Path) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.slice(pcm, start_secs, duration_secs, out)
    }
}

//! Persistent player controller
//!
//! Supervises one long-lived external player running idle and headless with
//! its control socket bound to a per-instance path. Segment playback is a
//! handful of IPC commands; the only expensive step is loading a different
//! file, after which further segments of that file start near-instantly.
//!
//! **Known limitation:** IPC writes have no caller-side timeout. A wedged
//! player blocks the caller.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::player::deferred::DeferredStop;
use crate::player::ipc::{IpcClient, IpcCommand};
use crate::player::process::shorten_diagnostic;
use crate::player::WindowMode;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Poll interval while waiting for the control socket
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(50);

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// Unique control socket path for a new controller instance
fn unique_socket_path() -> PathBuf {
    let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "segplay-player-{}-{}.sock",
        std::process::id(),
        instance
    ))
}

/// One long-lived player process driven over IPC
pub struct PersistentPlayer {
    binary: PathBuf,
    window_mode: WindowMode,
    startup_timeout: Duration,
    terminate_wait: Duration,
    load_settle: Duration,
    client: IpcClient,
    child: Option<Child>,
    loaded: Option<PathBuf>,
    /// Cleared by pause/stop and by the deferred stop when it fires
    active: Arc<AtomicBool>,
    timer: DeferredStop,
}

impl PersistentPlayer {
    pub fn new(binary: PathBuf, config: &EngineConfig) -> Self {
        Self::with_socket(binary, config, unique_socket_path())
    }

    pub fn with_socket(binary: PathBuf, config: &EngineConfig, socket_path: PathBuf) -> Self {
        Self {
            binary,
            window_mode: config.window_mode,
            startup_timeout: config.player_startup_timeout,
            terminate_wait: config.terminate_wait,
            load_settle: config.load_settle,
            client: IpcClient::new(socket_path),
            child: None,
            loaded: None,
            active: Arc::new(AtomicBool::new(false)),
            timer: DeferredStop::new(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        self.client.socket_path()
    }

    pub fn loaded_file(&self) -> Option<&Path> {
        self.loaded.as_deref()
    }

    /// True while the player process is alive
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// True while a segment is playing
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Launch the player and wait for its control socket
    ///
    /// A second call while running is a no-op success.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        self.child = None;
        self.loaded = None;
        self.remove_socket();

        let mut command = Command::new(&self.binary);
        command
            .arg("--idle=yes")
            .arg("--no-terminal")
            .arg("--keep-open=yes")
            .arg("--pause")
            .args(self.window_mode.persistent_player_args())
            .arg(format!("--input-ipc-server={}", self.socket_path().display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        info!(
            binary = %self.binary.display(),
            socket = %self.socket_path().display(),
            pid = ?child.id(),
            "Started persistent player"
        );

        let deadline = tokio::time::Instant::now() + self.startup_timeout;
        loop {
            if self.socket_path().exists() {
                // Drop the stderr pipe so a chatty player never blocks on it
                child.stderr.take();
                self.child = Some(child);
                return Ok(());
            }

            if let Some(status) = child.try_wait()? {
                let stderr = match child.stderr.take() {
                    Some(mut err) => {
                        use tokio::io::AsyncReadExt;
                        let mut buf = Vec::new();
                        let _ = tokio::time::timeout(
                            Duration::from_millis(200),
                            err.read_to_end(&mut buf),
                        )
                        .await;
                        shorten_diagnostic(&buf)
                    }
                    None => String::new(),
                };
                warn!(%status, %stderr, "Persistent player exited during startup");
                self.remove_socket();
                return Err(Error::ProcessExitedEarly { status, stderr });
            }

            if tokio::time::Instant::now() >= deadline {
                warn!("Persistent player socket never appeared");
                let _ = child.start_kill();
                let _ = child.wait().await;
                self.remove_socket();
                return Err(Error::StartupTimeout {
                    waited_ms: self.startup_timeout.as_millis() as u64,
                });
            }

            tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
        }
    }

    /// Play `[start, start + duration]` of `file`, pausing automatically at the end
    pub async fn play_segment(&mut self, file: &Path, start: f64, duration: f64) -> Result<()> {
        if !start.is_finite() || start < 0.0 {
            return Err(Error::InvalidRange(format!("start {start}")));
        }
        let stop_after = Duration::try_from_secs_f64(duration)
            .map_err(|e| Error::InvalidRange(format!("duration {duration}: {e}")))?;

        // A stale timer must never pause this new playback
        self.timer.cancel().await;

        if self.loaded.as_deref() != Some(file) {
            debug!(file = %file.display(), "Loading file into persistent player");
            self.loaded = None;
            self.client.send(&IpcCommand::load_replace(file)).await?;
            self.loaded = Some(file.to_path_buf());
            tokio::time::sleep(self.load_settle).await;
        }

        let end = start + duration;
        self.client
            .send_all(&[
                IpcCommand::pause(true),
                IpcCommand::seek_absolute(start),
                IpcCommand::loop_start(start),
                IpcCommand::loop_end(end),
                IpcCommand::pause(false),
            ])
            .await?;
        self.active.store(true, Ordering::SeqCst);

        let client = self.client.clone();
        let active = Arc::clone(&self.active);
        self.timer
            .arm(stop_after, move || async move {
                if let Err(e) = send_pause(&client).await {
                    debug!(error = %e, "Deferred pause failed");
                }
                active.store(false, Ordering::SeqCst);
            })
            .await;

        debug!(start, duration, "Persistent player segment armed");
        Ok(())
    }

    /// Cancel the deferred stop, pause and clear the loop region
    pub async fn pause(&mut self) -> Result<()> {
        self.timer.cancel().await;
        self.active.store(false, Ordering::SeqCst);
        send_pause(&self.client).await
    }

    /// Pause, terminate the player and remove its socket
    pub async fn stop(&mut self) {
        self.timer.cancel().await;

        if self.is_running() {
            if let Err(e) = send_pause(&self.client).await {
                debug!(error = %e, "Pause before stop failed");
            }
        }

        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill_graceful();
            match tokio::time::timeout(self.terminate_wait, child.wait()).await {
                Ok(_) => debug!("Persistent player exited"),
                Err(_) => {
                    warn!("Persistent player ignored terminate, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        self.loaded = None;
        self.active.store(false, Ordering::SeqCst);
        self.remove_socket();
    }

    fn remove_socket(&self) {
        let path = self.socket_path();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "Could not remove socket file");
            }
        }
    }
}

impl Drop for PersistentPlayer {
    fn drop(&mut self) {
        // The timer aborts itself on drop; kill_on_drop reaps the child
        self.remove_socket();
    }
}

async fn send_pause(client: &IpcClient) -> Result<()> {
    let [clear_a, clear_b] = IpcCommand::clear_loop();
    client
        .send_all(&[IpcCommand::pause(true), clear_a, clear_b])
        .await
}

/// Graceful terminate for the persistent player
trait GracefulKill {
    fn start_kill_graceful(&mut self) -> std::io::Result<()>;
}

impl GracefulKill for Child {
    #[cfg(unix)]
    fn start_kill_graceful(&mut self) -> std::io::Result<()> {
        match self.id() {
            Some(pid) => {
                // SAFETY: plain signal delivery to our own child.
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                if rc == 0 {
                    Ok(())
                } else {
                    Err(std::io::Error::last_os_error())
                }
            }
            None => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn start_kill_graceful(&mut self) -> std::io::Result<()> {
        self.start_kill()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    fn fake_player(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-player");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            player_startup_timeout: Duration::from_millis(1500),
            terminate_wait: Duration::from_millis(500),
            load_settle: Duration::ZERO,
            window_mode: WindowMode::Hidden,
            ..EngineConfig::default()
        }
    }

    /// Stand in for the player's IPC server: bind the socket and record lines
    fn spawn_recorder(socket: PathBuf, delay: Duration) -> Arc<Mutex<Vec<String>>> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let listener = UnixListener::bind(&socket).unwrap();
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = String::new();
                let _ = stream.read_to_string(&mut buf).await;
                sink.lock().unwrap().push(buf.trim_end().to_string());
            }
        });
        lines
    }

    #[tokio::test]
    async fn test_start_fails_when_player_exits() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_player(dir.path(), "echo 'no audio device' >&2; exit 1");
        let mut player =
            PersistentPlayer::with_socket(binary, &test_config(), dir.path().join("p.sock"));

        match player.start().await {
            Err(Error::ProcessExitedEarly { stderr, .. }) => {
                assert_eq!(stderr, "no audio device");
            }
            other => panic!("expected early exit, got {other:?}"),
        }
        assert!(!player.is_running());
    }

    #[tokio::test]
    async fn test_start_times_out_without_socket() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_player(dir.path(), "exec sleep 30");
        let config = EngineConfig {
            player_startup_timeout: Duration::from_millis(200),
            ..test_config()
        };
        let mut player = PersistentPlayer::with_socket(binary, &config, dir.path().join("p.sock"));

        assert!(matches!(
            player.start().await,
            Err(Error::StartupTimeout { waited_ms: 200 })
        ));
        assert!(!player.is_running());
    }

    #[tokio::test]
    async fn test_start_removes_stale_socket_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("p.sock");
        std::fs::write(&socket, b"stale").unwrap();

        let binary = fake_player(dir.path(), "exec sleep 30");
        let mut player = PersistentPlayer::with_socket(binary, &test_config(), socket.clone());
        let _lines = spawn_recorder(socket.clone(), Duration::from_millis(150));

        player.start().await.unwrap();
        assert!(player.is_running());
        player.start().await.unwrap();
        assert!(player.is_running());

        player.stop().await;
        assert!(!player.is_running());
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_play_segment_command_sequence_and_auto_pause() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("p.sock");
        let binary = fake_player(dir.path(), "exec sleep 30");
        let mut player = PersistentPlayer::with_socket(binary, &test_config(), socket.clone());
        let lines = spawn_recorder(socket.clone(), Duration::from_millis(50));

        player.start().await.unwrap();
        let file = dir.path().join("talk.wav");
        player.play_segment(&file, 2.0, 0.5).await.unwrap();
        assert!(player.is_active());
        assert_eq!(player.loaded_file(), Some(file.as_path()));

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(!player.is_active(), "deferred stop should have paused");

        let recorded = lines.lock().unwrap().clone();
        assert!(recorded[0].contains("\"loadfile\""));
        assert_eq!(recorded[1], "{\"command\":[\"set_property\",\"pause\",true]}");
        assert_eq!(recorded[2], "{\"command\":[\"seek\",2.0,\"absolute\"]}");
        assert_eq!(recorded[3], "{\"command\":[\"set_property\",\"ab-loop-a\",2.0]}");
        assert_eq!(recorded[4], "{\"command\":[\"set_property\",\"ab-loop-b\",2.5]}");
        assert_eq!(recorded[5], "{\"command\":[\"set_property\",\"pause\",false]}");
        // deferred stop: pause + clear loop
        assert_eq!(recorded[6], "{\"command\":[\"set_property\",\"pause\",true]}");
        assert_eq!(recorded.len(), 9);

        player.stop().await;
    }

    #[tokio::test]
    async fn test_same_file_is_not_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("p.sock");
        let binary = fake_player(dir.path(), "exec sleep 30");
        let mut player = PersistentPlayer::with_socket(binary, &test_config(), socket.clone());
        let lines = spawn_recorder(socket.clone(), Duration::from_millis(50));

        player.start().await.unwrap();
        let file = dir.path().join("talk.wav");
        player.play_segment(&file, 1.0, 5.0).await.unwrap();
        player.play_segment(&file, 3.0, 5.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let loads = lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.contains("loadfile"))
            .count();
        assert_eq!(loads, 1);

        player.stop().await;
        assert!(!player.is_active());
    }

    #[tokio::test]
    async fn test_unrepresentable_duration_is_rejected_before_sending() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("p.sock");
        let binary = fake_player(dir.path(), "exec sleep 30");
        let mut player = PersistentPlayer::with_socket(binary, &test_config(), socket.clone());
        let lines = spawn_recorder(socket.clone(), Duration::from_millis(50));

        player.start().await.unwrap();
        let file = dir.path().join("talk.wav");
        assert!(matches!(
            player.play_segment(&file, 0.0, 1e20).await,
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            player.play_segment(&file, f64::NAN, 1.0).await,
            Err(Error::InvalidRange(_))
        ));
        assert!(!player.is_active());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(lines.lock().unwrap().is_empty());

        player.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stale_auto_pause_lands_before_next_segment() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("p.sock");
        let binary = fake_player(dir.path(), "exec sleep 30");
        let mut player = PersistentPlayer::with_socket(binary, &test_config(), socket.clone());
        let lines = spawn_recorder(socket.clone(), Duration::from_millis(50));

        player.start().await.unwrap();
        let file = dir.path().join("talk.wav");
        for _ in 0..10 {
            player.play_segment(&file, 0.0, 0.01).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            player.play_segment(&file, 5.0, 2.0).await.unwrap();
            assert!(player.is_active());
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(player.is_active());
        let recorded = lines.lock().unwrap().clone();
        let last_pause = recorded
            .iter()
            .rev()
            .find(|l| l.contains("\"pause\""))
            .unwrap();
        assert_eq!(last_pause, "{\"command\":[\"set_property\",\"pause\",false]}");

        player.stop().await;
    }

    #[tokio::test]
    async fn test_new_segment_cancels_previous_timer() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("p.sock");
        let binary = fake_player(dir.path(), "exec sleep 30");
        let mut player = PersistentPlayer::with_socket(binary, &test_config(), socket.clone());
        let _lines = spawn_recorder(socket.clone(), Duration::from_millis(50));

        player.start().await.unwrap();
        let file = dir.path().join("talk.wav");
        player.play_segment(&file, 0.0, 0.2).await.unwrap();
        player.play_segment(&file, 5.0, 2.0).await.unwrap();

        // Well past the first segment's end: its timer must not have fired
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(player.is_active());

        player.stop().await;
    }
}

//! One-shot player processes
//!
//! A one-shot process plays a single file (or a seek window of one) and
//! exits on its own. Termination escalates: process-group SIGTERM on POSIX,
//! direct terminate elsewhere, bounded wait, then force-kill.

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Limit on diagnostic text kept from a failed process
const STDERR_LIMIT: usize = 1600;

/// A spawned player process owned by the playback session
#[derive(Debug)]
pub struct OneShotProcess {
    child: Child,
    label: String,
}

impl OneShotProcess {
    /// Spawn `program` with `args` in its own process group
    pub fn spawn<I, S>(program: &Path, args: I, label: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        info!(
            program = %program.display(),
            pid = ?child.id(),
            label,
            "Spawned player process"
        );

        Ok(Self {
            child,
            label: label.to_string(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// True while the process has not exited
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Fail if the process exits within `grace`
    ///
    /// On early exit the error carries whatever the process wrote to stderr.
    pub async fn verify_started(&mut self, grace: Duration) -> Result<()> {
        tokio::time::sleep(grace).await;

        let status = match self.child.try_wait()? {
            None => return Ok(()),
            Some(status) => status,
        };

        let stderr = self.read_stderr().await;
        Err(Error::ProcessExitedEarly { status, stderr })
    }

    /// Stop the process, escalating to force-kill after `wait`
    pub async fn terminate(&mut self, wait: Duration) {
        if !self.is_alive() {
            return;
        }

        debug!(pid = ?self.child.id(), label = %self.label, "Terminating player process");
        self.signal_terminate();

        match tokio::time::timeout(wait, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Player process exited"),
            Ok(Err(e)) => warn!(error = %e, "Waiting on player process failed"),
            Err(_) => {
                warn!(label = %self.label, "Player ignored terminate, killing");
                self.signal_kill();
                let _ = self.child.wait().await;
            }
        }
    }

    /// Wait for natural exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    async fn read_stderr(&mut self) -> String {
        let Some(mut err) = self.child.stderr.take() else {
            return String::new();
        };
        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_millis(200), err.read_to_end(&mut buf)).await;
        if read.is_err() {
            debug!("Timed out reading player stderr");
        }
        shorten_diagnostic(&buf)
    }

    #[cfg(unix)]
    fn signal_terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: plain signal delivery to the group this child leads.
            let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGTERM) };
            if rc == 0 {
                return;
            }
        }
        let _ = self.child.start_kill();
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) {
        let _ = self.child.start_kill();
    }

    #[cfg(unix)]
    fn signal_kill(&mut self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: see signal_terminate.
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
        let _ = self.child.start_kill();
    }

    #[cfg(not(unix))]
    fn signal_kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Trim process output down to a short diagnostic
pub fn shorten_diagnostic(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw).trim().to_string();
    if text.len() <= STDERR_LIMIT {
        return text;
    }
    let mut cut = STDERR_LIMIT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    #[tokio::test]
    async fn test_long_running_process_passes_grace() {
        let mut process = OneShotProcess::spawn(&sh(), ["-c", "sleep 5"], "test").unwrap();
        process
            .verify_started(Duration::from_millis(100))
            .await
            .unwrap();
        assert!(process.is_alive());

        process.terminate(Duration::from_millis(1000)).await;
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_early_exit_captures_stderr() {
        let mut process =
            OneShotProcess::spawn(&sh(), ["-c", "echo 'bad input' >&2; exit 3"], "test").unwrap();
        let err = process
            .verify_started(Duration::from_millis(300))
            .await
            .unwrap_err();

        match err {
            Error::ProcessExitedEarly { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "bad input");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_terminate_escalates_when_term_ignored() {
        let mut process = OneShotProcess::spawn(
            &sh(),
            ["-c", "trap '' TERM; sleep 5"],
            "stubborn",
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        process.terminate(Duration::from_millis(200)).await;
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_terminate_after_exit_is_noop() {
        let mut process = OneShotProcess::spawn(&sh(), ["-c", "exit 0"], "quick").unwrap();
        process.wait().await.unwrap();
        process.terminate(Duration::from_millis(100)).await;
        assert!(!process.is_alive());
    }

    #[test]
    fn test_shorten_diagnostic_truncates() {
        let long = "x".repeat(STDERR_LIMIT + 50);
        let short = shorten_diagnostic(long.as_bytes());
        assert!(short.ends_with("..."));
        assert_eq!(short.len(), STDERR_LIMIT + 3);
    }
}

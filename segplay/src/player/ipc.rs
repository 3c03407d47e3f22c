//! Persistent player control protocol
//!
//! Each command is one UTF-8 line holding a JSON object `{"command": [...]}`
//! terminated by `\n`. Every command opens its own short-lived connection to
//! the player's local socket, writes the line and closes. No response is read.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One control command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpcCommand {
    command: Vec<Value>,
}

impl IpcCommand {
    pub fn new(args: Vec<Value>) -> Self {
        Self { command: args }
    }

    /// Load a file, replacing whatever is loaded
    pub fn load_replace(path: &Path) -> Self {
        Self::new(vec![
            json!("loadfile"),
            json!(path.to_string_lossy()),
            json!("replace"),
        ])
    }

    pub fn set_property(name: &str, value: Value) -> Self {
        Self::new(vec![json!("set_property"), json!(name), value])
    }

    pub fn pause(paused: bool) -> Self {
        Self::set_property("pause", json!(paused))
    }

    pub fn seek_absolute(position_secs: f64) -> Self {
        Self::new(vec![json!("seek"), json!(position_secs), json!("absolute")])
    }

    pub fn loop_start(position_secs: f64) -> Self {
        Self::set_property("ab-loop-a", json!(position_secs))
    }

    pub fn loop_end(position_secs: f64) -> Self {
        Self::set_property("ab-loop-b", json!(position_secs))
    }

    /// Commands that clear the loop region
    pub fn clear_loop() -> [Self; 2] {
        [
            Self::set_property("ab-loop-a", json!("no")),
            Self::set_property("ab-loop-b", json!("no")),
        ]
    }

    /// Serialized wire form, newline included
    pub fn to_line(&self) -> Result<String> {
        let mut line =
            serde_json::to_string(self).map_err(|e| Error::Ipc(format!("encode failed: {e}")))?;
        line.push('\n');
        Ok(line)
    }

    pub fn args(&self) -> &[Value] {
        &self.command
    }
}

/// Fire-and-forget client for one control socket
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one command over its own connection
    #[cfg(unix)]
    pub async fn send(&self, command: &IpcCommand) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        use tokio::net::UnixStream;

        let line = command.to_line()?;
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::Ipc(format!("connect {} failed: {e}", self.socket_path.display()))
        })?;
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Ipc(format!("write failed: {e}")))?;
        let _ = stream.shutdown().await;

        debug!(command = %line.trim_end(), "Sent player command");
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn send(&self, _command: &IpcCommand) -> Result<()> {
        Err(Error::Ipc(
            "local socket control is not supported on this platform".to_string(),
        ))
    }

    /// Send commands in order, stopping at the first connection error
    pub async fn send_all(&self, commands: &[IpcCommand]) -> Result<()> {
        for command in commands {
            self.send(command).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_wire_format() {
        let line = IpcCommand::seek_absolute(12.5).to_line().unwrap();
        assert_eq!(line, "{\"command\":[\"seek\",12.5,\"absolute\"]}\n");
    }

    #[test]
    fn test_pause_wire_format() {
        let line = IpcCommand::pause(true).to_line().unwrap();
        assert_eq!(line, "{\"command\":[\"set_property\",\"pause\",true]}\n");
    }

    #[test]
    fn test_load_replace_carries_path() {
        let cmd = IpcCommand::load_replace(Path::new("/media/talk.mp3"));
        assert_eq!(cmd.args()[0], json!("loadfile"));
        assert_eq!(cmd.args()[1], json!("/media/talk.mp3"));
        assert_eq!(cmd.args()[2], json!("replace"));
    }

    #[test]
    fn test_clear_loop_resets_both_ends() {
        let [a, b] = IpcCommand::clear_loop();
        assert_eq!(a.args()[1], json!("ab-loop-a"));
        assert_eq!(b.args()[1], json!("ab-loop-b"));
        assert_eq!(a.args()[2], json!("no"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_each_command_is_one_line_per_connection() {
        use tokio::io::AsyncReadExt;
        use tokio::net::UnixListener;

        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("ctl.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let server = tokio::spawn(async move {
            let mut lines = Vec::new();
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = String::new();
                stream.read_to_string(&mut buf).await.unwrap();
                lines.push(buf);
            }
            lines
        });

        let client = IpcClient::new(&socket);
        client
            .send_all(&[IpcCommand::pause(true), IpcCommand::seek_absolute(3.0)])
            .await
            .unwrap();

        let lines = server.await.unwrap();
        assert_eq!(lines[0], "{\"command\":[\"set_property\",\"pause\",true]}\n");
        assert_eq!(lines[1], "{\"command\":[\"seek\",3.0,\"absolute\"]}\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_without_listener_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(dir.path().join("missing.sock"));
        let result = client.send(&IpcCommand::pause(false)).await;
        assert!(matches!(result, Err(Error::Ipc(_))));
    }
}

//! Server process and its I/O tasks.
//!
//! Three tasks serve one process: a writer draining outbound frames into
//! stdin, a reader forwarding raw stdout chunks, and a watcher that owns the
//! `Child`, delivers terminate/kill requests and reports the exit. None of
//! them touch session state; everything flows to the client through its inbox.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ServerConfig;
use crate::protocol::RequestId;
use crate::types::ApplyWorkspaceEditResponse;

/// Grace period before killing a server whose client was dropped.
const ORPHAN_GRACE: Duration = Duration::from_secs(2);

/// How long the exit report waits for the reader to drain stdout.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Everything the client learns from outside its own call stack.
#[derive(Debug)]
pub(crate) enum InboxMessage {
    Output {
        generation: u64,
        bytes: Vec<u8>,
    },
    Exited {
        generation: u64,
        status: Option<ExitStatus>,
    },
    EditApplied {
        generation: u64,
        id: RequestId,
        response: ApplyWorkspaceEditResponse,
    },
}

#[derive(Debug)]
pub(crate) enum WriterCommand {
    Send(Vec<u8>),
    /// Close stdin.
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
enum ControlCommand {
    Terminate,
    Kill,
}

/// Handle to a running server process.
///
/// Dropping it closes stdin and, after a grace period, kills the process.
#[derive(Debug)]
pub(crate) struct Transport {
    writer_tx: mpsc::UnboundedSender<WriterCommand>,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    exited: watch::Receiver<bool>,
}

impl Transport {
    /// Spawn the configured server in `root`. Must be called within a Tokio
    /// runtime.
    pub fn spawn(
        config: &ServerConfig,
        root: &Path,
        generation: u64,
        inbox: mpsc::UnboundedSender<InboxMessage>,
    ) -> Result<Self> {
        let resolved_cmd = which::which(&config.command)
            .with_context(|| format!("{} not found in PATH", config.command))?;
        let mut cmd = Command::new(&resolved_cmd);
        cmd.args(&config.args)
            .current_dir(root)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", config.command))?;

        let stdout = child.stdout.take().context("no stdout from child")?;
        let stdin = child.stdin.take().context("no stdin from child")?;
        let pid = child.id();

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_frames(stdin, writer_rx));

        let (reader_done_tx, reader_done_rx) = oneshot::channel();
        tokio::spawn(read_output(stdout, generation, inbox.clone(), reader_done_tx));

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (exited_tx, exited) = watch::channel(false);
        tokio::spawn(watch_child(
            child,
            control_rx,
            reader_done_rx,
            generation,
            inbox,
            exited_tx,
        ));

        tracing::info!(
            "Spawned LSP server {} (pid {})",
            resolved_cmd.display(),
            pid.map_or_else(|| "?".to_string(), |pid| pid.to_string())
        );

        Ok(Self {
            writer_tx,
            control_tx,
            exited,
        })
    }

    /// Queue an encoded frame. Returns `false` once the writer is gone.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.writer_tx.send(WriterCommand::Send(frame)).is_ok()
    }

    pub fn close_input(&self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown);
    }

    /// SIGTERM on Unix; a hard kill elsewhere.
    pub fn terminate(&self) {
        let _ = self.control_tx.send(ControlCommand::Terminate);
    }

    pub fn kill(&self) {
        let _ = self.control_tx.send(ControlCommand::Kill);
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Wait up to `timeout` for the process to exit.
    pub async fn wait_exit(&mut self, timeout: Duration) -> bool {
        // A closed channel means the watcher is gone, which counts as exited.
        let wait = self.exited.wait_for(|exited| *exited);
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Transport without a process. Outbound frames land in the returned
    /// receiver; the process never exits unless the test says so.
    #[cfg(test)]
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<WriterCommand>, watch::Sender<bool>) {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (control_tx, _control_rx) = mpsc::unbounded_channel();
        let (exited_tx, exited) = watch::channel(false);
        let transport = Self {
            writer_tx,
            control_tx,
            exited,
        };
        (transport, writer_rx, exited_tx)
    }
}

async fn write_frames(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Send(frame) => {
                let written = match stdin.write_all(&frame).await {
                    Ok(()) => stdin.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    tracing::warn!("LSP write error: {e}");
                    break;
                }
            }
            WriterCommand::Shutdown => break,
        }
    }
    tracing::trace!("LSP writer finished");
}

async fn read_output(
    mut stdout: ChildStdout,
    generation: u64,
    inbox: mpsc::UnboundedSender<InboxMessage>,
    done: oneshot::Sender<()>,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("LSP server closed stdout");
                break;
            }
            Ok(n) => {
                let message = InboxMessage::Output {
                    generation,
                    bytes: buf[..n].to_vec(),
                };
                if inbox.send(message).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("LSP read error: {e}");
                break;
            }
        }
    }
    let _ = done.send(());
}

enum Watch {
    Exited(Option<ExitStatus>),
    Control(Option<ControlCommand>),
}

async fn watch_child(
    mut child: Child,
    mut control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    reader_done: oneshot::Receiver<()>,
    generation: u64,
    inbox: mpsc::UnboundedSender<InboxMessage>,
    exited_tx: watch::Sender<bool>,
) {
    let status = loop {
        let event = tokio::select! {
            status = child.wait() => Watch::Exited(status.ok()),
            command = control_rx.recv() => Watch::Control(command),
        };
        match event {
            Watch::Exited(status) => break status,
            Watch::Control(Some(ControlCommand::Terminate)) => terminate(&mut child),
            Watch::Control(Some(ControlCommand::Kill)) => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Failed to kill LSP server: {e}");
                }
            }
            Watch::Control(None) => break reap_orphan(&mut child).await,
        }
    };

    match status {
        Some(status) => tracing::info!("LSP server exited: {status}"),
        None => tracing::info!("LSP server exited"),
    }

    let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader_done).await;
    let _ = inbox.send(InboxMessage::Exited { generation, status });
    let _ = exited_tx.send(true);
}

async fn reap_orphan(child: &mut Child) -> Option<ExitStatus> {
    if let Ok(status) = tokio::time::timeout(ORPHAN_GRACE, child.wait()).await {
        return status.ok();
    }
    tracing::debug!("Orphaned LSP server didn't exit in time, killing");
    let _ = child.start_kill();
    child.wait().await.ok()
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: `pid` is our own child and has not been reaped (`id()` is
    // `Some` until then).
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == -1 {
        tracing::debug!(
            "SIGTERM to LSP server failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("Failed to kill LSP server: {e}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ServerConfig {
        ServerConfig::new("sh").with_args(["-c", script])
    }

    async fn next_exit(rx: &mut mpsc::UnboundedReceiver<InboxMessage>) -> Option<ExitStatus> {
        loop {
            match rx.recv().await {
                Some(InboxMessage::Exited { status, .. }) => return status,
                Some(_) => {}
                None => panic!("inbox closed before exit"),
            }
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = ServerConfig::new("lantern-definitely-not-a-real-binary");
        let err = Transport::spawn(&config, Path::new("."), 1, tx).unwrap_err();
        assert!(err.to_string().contains("not found in PATH"));
    }

    #[tokio::test]
    async fn test_output_forwarded_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _transport = Transport::spawn(&sh("printf hello"), Path::new("."), 7, tx).unwrap();

        let mut collected = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                InboxMessage::Output { generation, bytes } => {
                    assert_eq!(generation, 7);
                    collected.extend(bytes);
                }
                InboxMessage::Exited { generation, .. } => {
                    assert_eq!(generation, 7);
                    break;
                }
                InboxMessage::EditApplied { .. } => unreachable!(),
            }
        }
        assert_eq!(collected, b"hello");
    }

    #[tokio::test]
    async fn test_stdin_round_trip_and_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = Transport::spawn(&sh("cat"), Path::new("."), 1, tx).unwrap();
        assert!(transport.send(b"ping".to_vec()));

        match rx.recv().await.unwrap() {
            InboxMessage::Output { bytes, .. } => assert_eq!(bytes, b"ping"),
            other => panic!("unexpected: {other:?}"),
        }

        transport.close_input();
        assert!(transport.wait_exit(Duration::from_secs(5)).await);
        assert!(transport.has_exited());
        let status = next_exit(&mut rx).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_terminate_stops_stubborn_process() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport =
            Transport::spawn(&sh("exec sleep 30"), Path::new("."), 1, tx).unwrap();
        transport.close_input();
        assert!(!transport.wait_exit(Duration::from_millis(100)).await);

        transport.terminate();
        assert!(transport.wait_exit(Duration::from_secs(5)).await);
        let status = next_exit(&mut rx).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_kill() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport =
            Transport::spawn(&sh("trap '' TERM; exec sleep 30"), Path::new("."), 1, tx).unwrap();
        transport.kill();
        assert!(transport.wait_exit(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_env_and_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sh("printf '%s|' \"$LANTERN_PROBE\"; pwd");
        config.env.insert("LANTERN_PROBE".into(), "on".into());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _transport = Transport::spawn(&config, dir.path(), 1, tx).unwrap();

        let mut collected = Vec::new();
        while let Some(message) = rx.recv().await {
            match message {
                InboxMessage::Output { bytes, .. } => collected.extend(bytes),
                _ => break,
            }
        }
        let output = String::from_utf8(collected).unwrap();
        let (marker, cwd) = output.trim_end().split_once('|').unwrap();
        assert_eq!(marker, "on");
        assert_eq!(
            std::fs::canonicalize(cwd).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }
}

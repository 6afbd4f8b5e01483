use crate::error::{ChatError, ChatResult};
use std::net::TcpListener;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// How many ports after the preferred one are tried.
const PORT_SEARCH_SPAN: u16 = 10;

pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// First free port in `start..start + 10`, or `start` itself if none is free.
pub fn find_available_port(start: u16) -> u16 {
    (start..start.saturating_add(PORT_SEARCH_SPAN))
        .find(|port| is_port_available(*port))
        .unwrap_or(start)
}

/// Substitutes `{port}` in every argument.
pub fn render_args(template: &[String], port: u16) -> Vec<String> {
    let port = port.to_string();
    template.iter().map(|arg| arg.replace("{port}", &port)).collect()
}

/// The model server child process.
///
/// The child is killed when this value is dropped.
pub struct Sidecar {
    child: Child,
    port: u16,
}

impl Sidecar {
    pub fn spawn(program: &str, args: &[String], port: u16) -> ChatResult<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ChatError::startup(format!("failed to spawn {program}: {err}")))?;

        tracing::info!(program, port, pid = ?child.id(), "model server spawned");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, "stderr"));
        }

        Ok(Self { child, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `Some(status)` once the process has exited.
    pub fn exit_status(&mut self) -> ChatResult<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Sends the kill signal without waiting for the process to exit.
    pub fn start_kill(&mut self) -> ChatResult<()> {
        if self.exit_status()?.is_none() {
            self.child.start_kill()?;
        }
        Ok(())
    }

    pub async fn kill(&mut self) -> ChatResult<()> {
        if self.exit_status()?.is_none() {
            self.child.kill().await?;
            tracing::info!(port = self.port, "model server terminated");
        }
        Ok(())
    }
}

async fn forward_output(stream: impl AsyncRead + Unpin, stream_name: &'static str) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "sidecar", stream = stream_name, "{line}"),
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(target: "sidecar", stream = stream_name, error = %err, "output read failed");
                break;
            }
        }
    }
}

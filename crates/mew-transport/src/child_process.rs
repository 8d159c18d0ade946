// SPDX-License-Identifier: MIT OR Apache-2.0
//! Child-process transport: a spawned agent speaking newline-delimited
//! envelope JSON over stdin/stdout.

use crate::{Transport, TransportError};
use async_trait::async_trait;
use mew_envelope::{Envelope, EnvelopeCodec};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};

/// Configuration for spawning a managed participant process.
#[derive(Clone, Debug)]
pub struct ChildProcessConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory for the process, if not the gateway's own.
    pub working_dir: Option<std::path::PathBuf>,
    /// Whether to inherit the gateway's environment.
    pub inherit_env: bool,
}

impl Default for ChildProcessConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            working_dir: None,
            inherit_env: true,
        }
    }
}

/// A [`Transport`] backed by a spawned child process, framed as one JSON
/// envelope per line on stdin/stdout.
pub struct ChildProcessTransport {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl ChildProcessTransport {
    /// Spawn the configured process and wire up its stdio as the transport.
    pub fn spawn(config: &ChildProcessConfig) -> Result<Self, TransportError> {
        let mut command = tokio::process::Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if !config.inherit_env {
            command.env_clear();
        }
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }
        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or(TransportError::Closed)?;
        let stdout = child.stdout.take().ok_or(TransportError::Closed)?;
        let lines = BufReader::new(stdout).lines();
        Ok(Self { child, stdin, lines })
    }
}

#[async_trait]
impl Transport for ChildProcessTransport {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let line = EnvelopeCodec::encode(&envelope)?;
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        loop {
            match self.lines.next_line().await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(EnvelopeCodec::decode(&line)?)),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let _ = self.child.start_kill();
        Ok(())
    }
}

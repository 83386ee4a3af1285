//! Wallet engine running as a child process.
//!
//! Requests go to the child's stdin and messages come back on its stdout,
//! one JSON document per line. Stderr lines are forwarded to the log.

use crate::domain::config::EngineConfig;
use crate::domain::error::EngineError;
use crate::engine::protocol::{EngineMessage, EngineRequest};
use crate::ports::outbound::{EngineConnector, EngineLink};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Spawns the configured engine program.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            working_dir: Some(config.storage_dir.clone()),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl EngineConnector for ProcessEngine {
    async fn start(&self) -> Result<EngineLink, EngineError> {
        if let Some(dir) = &self.working_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| EngineError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;
        }

        let mut child = self.command().spawn().map_err(|source| EngineError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(EngineError::Stdio("stdin"))?;
        let stdout = child.stdout.take().ok_or(EngineError::Stdio("stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "wallet_engine", "{line}");
                }
            });
        }

        info!(program = %self.program, pid = ?child.id(), "Wallet engine started");

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_requests(stdin, request_rx));
        tokio::spawn(read_messages(child, stdout, message_tx));

        Ok(EngineLink {
            requests: request_tx,
            messages: message_rx,
        })
    }
}

async fn write_requests(mut stdin: ChildStdin, mut requests: mpsc::UnboundedReceiver<EngineRequest>) {
    while let Some(request) = requests.recv().await {
        let mut line = match serde_json::to_vec(&request) {
            Ok(line) => line,
            Err(e) => {
                warn!(operation = %request.operation, error = %e, "Failed to encode engine request");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdin.write_all(&line).await {
            warn!(error = %e, "Wallet engine stdin closed");
            break;
        }
        if let Err(e) = stdin.flush().await {
            warn!(error = %e, "Failed to flush wallet engine stdin");
            break;
        }
    }
    // Dropping stdin signals EOF to the engine.
}

/// Owns the child so it is killed when the link goes away.
async fn read_messages(
    mut child: Child,
    stdout: ChildStdout,
    messages: mpsc::UnboundedSender<EngineMessage>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<EngineMessage>(&line) {
                    Ok(message) => {
                        if messages.send(message).is_err() {
                            debug!("Engine link dropped, stopping engine");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, line = %line, "Skipping malformed engine message"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read from wallet engine");
                break;
            }
        }
    }

    match child.try_wait() {
        Ok(Some(status)) => info!(%status, "Wallet engine exited"),
        Ok(None) => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to stop wallet engine");
            }
        }
        Err(e) => warn!(error = %e, "Failed to query wallet engine status"),
    }
}

//! Command execution inside a running service container, with one-shot
//! forwarding of SIGINT/SIGTERM to the spawned process.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::orchestrator::Orchestrator;
use crate::project::Project;
use crate::runtime::{ProcessConfig, StdioMode};

#[cfg(unix)]
const SIGINT: i32 = 2;
#[cfg(unix)]
const SIGTERM: i32 = 15;

/// Options for [`Orchestrator::exec`]
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Do not wait for the process; stdio is discarded
    pub detach: bool,
    /// Keep stdin open
    pub interactive: bool,
    /// Allocate a terminal
    pub tty: bool,
    /// Run as this user
    pub user: Option<String>,
    /// Working directory inside the container
    pub workdir: Option<String>,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl Orchestrator {
    /// Run a command inside a service's running container and return its
    /// exit code.
    ///
    /// In foreground mode the first SIGINT/SIGTERM observed is forwarded
    /// to the process exactly once; later signals are not forwarded.
    pub async fn exec(
        &self,
        project: &Project,
        service_name: &str,
        command: Vec<String>,
        options: &ExecOptions,
    ) -> Result<i32> {
        if command.is_empty() {
            return Err(Error::invalid_argument("exec requires a command"));
        }
        let service = project.services.get(service_name).ok_or_else(|| {
            Error::not_found(format!("service '{service_name}' is not part of the project"))
        })?;
        let id = project.container_id(service);

        let summary = self.runtime.containers.get(&id).await.map_err(|e| {
            if e.is_not_found() {
                Error::not_found(format!("service '{service_name}' has no container"))
            } else {
                e
            }
        })?;
        if !summary.status.is_running() {
            return Err(Error::invalid_argument(format!(
                "container '{id}' is not running"
            )));
        }

        let config = ProcessConfig {
            command,
            environment: options.env.clone(),
            working_dir: options.workdir.clone(),
            user: options.user.clone(),
            terminal: options.tty,
        };
        let stdio = if options.detach {
            StdioMode::Discard
        } else {
            StdioMode::Inherit
        };

        let mut handle = self
            .runtime
            .containers
            .create_process(&id, &config, stdio)
            .await?;
        handle.start().await?;

        if options.detach {
            return Ok(0);
        }

        let (signal_tx, mut signal_rx) = mpsc::channel::<i32>(1);
        let listener = spawn_signal_listener(signal_tx);

        let mut forwarded = false;
        let code = loop {
            // the wait future is recreated after a signal interrupts it;
            // the handle outlives each select round
            let received = tokio::select! {
                code = handle.wait() => break code?,
                signal = signal_rx.recv(), if !forwarded => signal,
            };
            forwarded = true;
            if let Some(signal) = received {
                debug!(signal, container = %id, "forwarding signal to exec process");
                if let Err(e) = handle.kill(signal).await {
                    debug!(error = %e, "signal forwarding failed");
                }
            }
        };

        if let Some(listener) = listener {
            listener.abort();
        }
        Ok(code)
    }
}

/// Watch for SIGINT/SIGTERM and push the first few into a channel; the
/// exec loop's latch makes the forwarding one-shot
#[cfg(unix)]
fn spawn_signal_listener(tx: mpsc::Sender<i32>) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).ok()?;
    let mut terminate = signal(SignalKind::terminate()).ok()?;
    Some(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = interrupt.recv() => SIGINT,
                _ = terminate.recv() => SIGTERM,
            };
            if tx.send(received).await.is_err() {
                return;
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_signal_listener(_tx: mpsc::Sender<i32>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

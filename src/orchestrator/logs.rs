//! Log streaming: reader tasks turn the runtime's per-container log
//! handles into one merged channel of [`LogEntry`] values.
//!
//! Ordering is preserved per (container, stream); entries from different
//! services interleave in arrival order.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::project::Project;
use crate::runtime::{LogSource, LogStream};

/// One log line from a project container
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Service the line belongs to
    pub service: String,
    /// Container the line came from
    pub container: String,
    /// Line content, without the trailing newline
    pub message: String,
    /// Which stream produced the line
    pub stream: LogStream,
    /// When the line was read
    pub timestamp: DateTime<Utc>,
}

/// Options for [`Orchestrator::logs`]
#[derive(Debug, Clone, Default)]
pub struct LogsOptions {
    /// Services to read (empty for all)
    pub services: Vec<String>,
    /// Keep streaming until cancelled instead of stopping at EOF
    pub follow: bool,
    /// Emit only the last N lines per stream (non-follow mode)
    pub tail: Option<usize>,
    /// Renderer hint carried through for callers
    pub timestamps: bool,
    /// Include boot logs (delivered on the stderr stream)
    pub include_boot: bool,
}

/// Keeps the reader tasks alive; dropping it cancels a follow stream
#[derive(Debug)]
pub struct LogStreamHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl LogStreamHandle {
    /// Wait for every reader to finish (non-follow streams end at EOF)
    pub async fn join(mut self) {
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for LogStreamHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Orchestrator {
    /// Open log streams for the selected services.
    ///
    /// The receiver closes once every source reaches EOF (non-follow) or
    /// when the handle is dropped (follow). Services without a container
    /// are skipped with a warning.
    pub async fn logs(
        &self,
        project: &Project,
        options: &LogsOptions,
    ) -> Result<(mpsc::Receiver<LogEntry>, LogStreamHandle)> {
        let (tx, rx) = mpsc::channel(256);
        let mut tasks = Vec::new();

        for service in project.services.values() {
            if !options.services.is_empty() && !options.services.contains(&service.name) {
                continue;
            }
            let id = project.container_id(service);
            let sources = match self
                .runtime
                .containers
                .logs(&id, options.follow, options.include_boot)
                .await
            {
                Ok(sources) => sources,
                Err(e) if e.is_not_found() => {
                    warn!(service = %service.name, "no container for service, skipping logs");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for source in sources {
                tasks.push(tokio::spawn(read_source(
                    source,
                    service.name.clone(),
                    id.clone(),
                    tx.clone(),
                    if options.follow { None } else { options.tail },
                )));
            }
        }

        Ok((rx, LogStreamHandle { tasks }))
    }
}

async fn read_source(
    source: LogSource,
    service: String,
    container: String,
    tx: mpsc::Sender<LogEntry>,
    tail: Option<usize>,
) {
    let stream = source.stream;
    let mut lines = BufReader::new(source.reader).lines();

    let entry = |message: String| LogEntry {
        service: service.clone(),
        container: container.clone(),
        message,
        stream,
        timestamp: Utc::now(),
    };

    match tail {
        Some(limit) => {
            let mut window: std::collections::VecDeque<String> =
                std::collections::VecDeque::with_capacity(limit);
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if window.len() == limit {
                            window.pop_front();
                        }
                        window.push_back(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(container = %container, error = %e, "log read failed");
                        break;
                    }
                }
            }
            for line in window {
                if tx.send(entry(line)).await.is_err() {
                    return;
                }
            }
        }
        None => loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(entry(line)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(container = %container, error = %e, "log read failed");
                    break;
                }
            }
        },
    }
}

//! Dependency condition waits and healthcheck polling.
//!
//! Each gate polls the runtime with its own deadline; the orchestrator
//! holds no lock across these waits.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};
use crate::project::HealthCheck;
use crate::runtime::{ContainerClient, ProcessConfig, StdioMode};

/// Deadline for a `service_started` dependency
pub const STARTED_TIMEOUT: Duration = Duration::from_secs(120);
/// Deadline for a `service_completed_successfully` dependency
pub const COMPLETED_TIMEOUT: Duration = Duration::from_secs(600);
/// Default delay between healthcheck attempts
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);
/// Default healthcheck attempt budget
pub const DEFAULT_HEALTH_RETRIES: u32 = 10;
/// Default deadline for the whole `up --wait` phase
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Delay between status polls
const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Wait until the container exists and reports running
pub async fn wait_started(containers: &dyn ContainerClient, id: &str) -> Result<()> {
    let deadline = Instant::now() + STARTED_TIMEOUT;
    loop {
        match containers.get(id).await {
            Ok(summary) if summary.status.is_running() => return Ok(()),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        if Instant::now() >= deadline {
            return Err(Error::timeout(
                format!("container '{id}' to start"),
                STARTED_TIMEOUT.as_secs(),
            ));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Best-effort completion wait: the container has disappeared from the
/// runtime listing
pub async fn wait_completed(containers: &dyn ContainerClient, id: &str) -> Result<()> {
    let deadline = Instant::now() + COMPLETED_TIMEOUT;
    loop {
        match containers.get(id).await {
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
            Ok(_) => {}
        }
        if Instant::now() >= deadline {
            return Err(Error::timeout(
                format!("container '{id}' to complete"),
                COMPLETED_TIMEOUT.as_secs(),
            ));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Run one healthcheck attempt inside the container; exit 0 is healthy.
/// Failures to spawn or wait count as unhealthy rather than erroring,
/// so callers can keep polling.
pub async fn run_healthcheck(
    containers: &dyn ContainerClient,
    id: &str,
    check: &HealthCheck,
) -> bool {
    let config = ProcessConfig {
        command: check.test.clone(),
        ..ProcessConfig::default()
    };
    let mut handle = match containers.create_process(id, &config, StdioMode::Discard).await {
        Ok(handle) => handle,
        Err(e) => {
            debug!(container = %id, error = %e, "healthcheck process failed to spawn");
            return false;
        }
    };
    if let Err(e) = handle.start().await {
        debug!(container = %id, error = %e, "healthcheck process failed to start");
        return false;
    }
    match handle.wait().await {
        Ok(code) => code == 0,
        Err(e) => {
            debug!(container = %id, error = %e, "healthcheck wait failed");
            false
        }
    }
}

/// Gate on a dependency's healthcheck: sleep the start period, then poll
/// with the configured interval and retry budget
pub async fn wait_healthy(
    containers: &dyn ContainerClient,
    id: &str,
    check: &HealthCheck,
) -> Result<()> {
    if let Some(start_period) = check.start_period {
        sleep(start_period).await;
    }
    let interval = check.interval.unwrap_or(DEFAULT_HEALTH_INTERVAL);
    let retries = check.retries.unwrap_or(DEFAULT_HEALTH_RETRIES);

    for attempt in 1..=retries {
        if run_healthcheck(containers, id, check).await {
            debug!(container = %id, attempt, "healthcheck passed");
            return Ok(());
        }
        if attempt < retries {
            sleep(interval).await;
        }
    }

    Err(Error::timeout(
        format!("container '{id}' to become healthy"),
        (interval * retries).as_secs(),
    ))
}

/// Wait until the container reports running, bounded by `deadline`
pub async fn wait_running_until(
    containers: &dyn ContainerClient,
    id: &str,
    deadline: Instant,
) -> Result<()> {
    loop {
        match containers.get(id).await {
            Ok(summary) if summary.status.is_running() => return Ok(()),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        if Instant::now() >= deadline {
            return Err(Error::timeout(format!("container '{id}' to run"), 0));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Poll the healthcheck until it passes, bounded by `deadline`
pub async fn wait_healthy_until(
    containers: &dyn ContainerClient,
    id: &str,
    check: &HealthCheck,
    deadline: Instant,
) -> Result<()> {
    let interval = check.interval.unwrap_or(DEFAULT_HEALTH_INTERVAL);
    loop {
        if run_healthcheck(containers, id, check).await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::timeout(format!("container '{id}' to be healthy"), 0));
        }
        sleep(interval).await;
    }
}

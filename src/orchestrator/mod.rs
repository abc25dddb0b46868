//! The orchestrator: reconciles a [`Project`] against the container
//! runtime.
//!
//! A single orchestrator instance serializes all mutations of its
//! project state behind one async mutex; operations may suspend on
//! runtime calls, and state interleaves only at those await points.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::project::{Project, Service};
use crate::resolver;
use crate::runtime::{labels, ContainerSummary, Runtime};

pub mod build;
pub mod exec;
pub mod fingerprint;
pub mod gates;
pub mod logs;
pub mod network;
pub mod reconcile;
pub mod state;
pub mod volume;

pub use build::{build_tag, effective_image_name, ExternalBuilder};
pub use exec::ExecOptions;
pub use logs::{LogEntry, LogStreamHandle, LogsOptions};

use state::OrchestratorState;

/// Image pull policy for `up`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PullPolicy {
    /// Always pull images
    Always,
    /// Pull images that are missing locally
    #[default]
    Missing,
    /// Never pull; fail when the image is absent
    Never,
}

impl std::fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Missing => write!(f, "missing"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Options for [`Orchestrator::up`]
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)] // mirrors the up flag surface
pub struct UpOptions {
    /// Services to bring up (empty for all)
    pub services: Vec<String>,
    /// Return after provisioning instead of waiting for a signal
    pub detach: bool,
    /// Recreate containers even when the configuration is unchanged
    pub force_recreate: bool,
    /// Never recreate existing containers
    pub no_recreate: bool,
    /// Start only the selected services, not their dependencies
    pub no_deps: bool,
    /// Remove containers for services no longer defined
    pub remove_orphans: bool,
    /// Tear the project down when the foreground run exits
    pub remove_on_exit: bool,
    /// Image pull policy
    pub pull: PullPolicy,
    /// Block until services are running/healthy
    pub wait: bool,
    /// Deadline for the whole wait phase, in seconds
    pub wait_timeout: Option<u64>,
    /// Skip healthcheck gating entirely
    pub disable_healthcheck: bool,
}

/// Options for [`Orchestrator::down`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DownOptions {
    /// Also delete project volumes (non-external and anonymous)
    pub remove_volumes: bool,
    /// Also match containers by name prefix, not just labels
    pub remove_orphans: bool,
}

/// What [`Orchestrator::down`] removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownReport {
    /// Container IDs removed
    pub removed_containers: Vec<String>,
    /// Volume names removed
    pub removed_volumes: Vec<String>,
}

/// One row of [`Orchestrator::ps`] output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsEntry {
    /// Service name
    pub service: String,
    /// Shortened container ID
    pub short_id: String,
    /// Image reference
    pub image: String,
    /// Container status
    pub status: String,
    /// Rendered port publications
    pub ports: Vec<String>,
}

/// The compose orchestrator
pub struct Orchestrator {
    pub(crate) runtime: Runtime,
    pub(crate) state: Mutex<OrchestratorState>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator over a runtime
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            state: Mutex::new(OrchestratorState::default()),
        }
    }

    /// Bring a project up: ensure networks, build images, remove
    /// orphans, then create and start containers in dependency order
    /// under the declared readiness gates.
    ///
    /// In foreground mode (`detach` false) this blocks after
    /// provisioning until the first SIGINT/SIGTERM, tears the project
    /// down, and returns [`Error::Interrupted`]; callers conventionally
    /// map that to exit code 130. A second signal during teardown exits
    /// the process with code 130 immediately.
    pub async fn up(&self, project: &Project, options: &UpOptions) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.purge_stale();
            state.touch(&project.name);
        }

        let services = self.filter_services(project, options);
        if services.is_empty() {
            debug!(project = %project.name, "nothing to start");
            return Ok(());
        }

        let networks = network::ensure_networks(self.runtime.networks.as_ref(), project).await?;
        self.build_images(&project.name, &services).await?;

        if options.remove_orphans {
            self.remove_orphans(project).await;
        }

        let plan = resolver::resolve(&services)?;
        info!(
            project = %project.name,
            services = services.len(),
            groups = plan.parallel_groups.len(),
            "starting services"
        );

        for group in &plan.parallel_groups {
            try_join_all(group.iter().map(|name| {
                let service = &services[name];
                let networks = &networks;
                async move {
                    self.wait_for_dependencies(project, service, options).await?;
                    self.reconcile_service(project, service, options, networks).await
                }
            }))
            .await?;
        }

        if options.wait {
            self.wait_phase(project, &services, options).await?;
        }

        if !options.detach {
            self.run_foreground(project, options.remove_on_exit).await?;
        }
        Ok(())
    }

    /// Tear a project down: stop and delete its containers, optionally
    /// its volumes, and its project-scoped networks. Individual failures
    /// are logged and skipped.
    pub async fn down(&self, project: &Project, options: &DownOptions) -> Result<DownReport> {
        let mut report = DownReport::default();

        let containers = self.runtime.containers.list().await?;
        for summary in containers {
            if !self.matches_project(project, &summary, options.remove_orphans) {
                continue;
            }
            if let Err(e) = self
                .runtime
                .containers
                .stop(&summary.id, std::time::Duration::from_secs(15))
                .await
            {
                debug!(container = %summary.id, error = %e, "graceful stop failed");
            }
            match self.runtime.containers.delete(&summary.id, true).await {
                Ok(()) => report.removed_containers.push(summary.id),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(container = %summary.id, error = %e, "failed to remove container"),
            }
        }

        if options.remove_volumes {
            for volume in project.volumes.values() {
                if volume.external {
                    continue;
                }
                match self.runtime.volumes.delete(&volume.name).await {
                    Ok(()) => report.removed_volumes.push(volume.name.clone()),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => warn!(volume = %volume.name, error = %e, "failed to remove volume"),
                }
            }
            if let Ok(volumes) = self.runtime.volumes.list().await {
                for volume in volumes {
                    let owned = volume.labels.get(labels::PROJECT).map(String::as_str)
                        == Some(project.name.as_str());
                    let anonymous = volume.labels.get(labels::ANONYMOUS).map(String::as_str)
                        == Some("true");
                    if owned && anonymous && !report.removed_volumes.contains(&volume.name) {
                        match self.runtime.volumes.delete(&volume.name).await {
                            Ok(()) => report.removed_volumes.push(volume.name),
                            Err(e) => {
                                warn!(volume = %volume.name, error = %e, "failed to remove volume");
                            }
                        }
                    }
                }
            }
        }

        for network in project.networks.values() {
            if network.external {
                continue;
            }
            let runtime_id = format!("{}_{}", project.name, network.name);
            match self.runtime.networks.delete(&runtime_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(network = %runtime_id, error = %e, "failed to remove network"),
            }
        }

        let mut state = self.state.lock().await;
        state.forget_project(&project.name);
        Ok(report)
    }

    /// List the project's containers
    pub async fn ps(&self, project: &Project) -> Result<Vec<PsEntry>> {
        let containers = self.runtime.containers.list().await?;
        let mut entries = Vec::new();
        for summary in containers {
            if !self.matches_project(project, &summary, true) {
                continue;
            }
            let service = summary
                .label(labels::SERVICE)
                .map(ToString::to_string)
                .or_else(|| {
                    summary
                        .id
                        .strip_prefix(&format!("{}_", project.name))
                        .map(ToString::to_string)
                })
                .unwrap_or_else(|| summary.id.clone());
            entries.push(PsEntry {
                service,
                short_id: summary.id.chars().take(12).collect(),
                image: summary.configuration.image.clone(),
                status: format!("{:?}", summary.status).to_lowercase(),
                ports: summary
                    .configuration
                    .published_ports
                    .iter()
                    .map(|p| {
                        format!(
                            "{}:{}->{}/{}",
                            p.host_address, p.host_port, p.container_port, p.protocol
                        )
                    })
                    .collect(),
            });
        }
        entries.sort_by(|a, b| a.service.cmp(&b.service));
        Ok(entries)
    }

    /// Start a project (an `up` with defaults, detached)
    pub async fn start(&self, project: &Project) -> Result<()> {
        self.up(
            project,
            &UpOptions {
                detach: true,
                ..UpOptions::default()
            },
        )
        .await
    }

    /// Stop a project (a best-effort `down` that keeps volumes)
    pub async fn stop(&self, project: &Project) -> Result<DownReport> {
        self.down(project, &DownOptions::default()).await
    }

    /// Restart a project: down, then a detached up
    pub async fn restart(&self, project: &Project) -> Result<()> {
        self.down(project, &DownOptions::default()).await?;
        self.start(project).await
    }

    /// Remove containers for the given services (all when empty).
    /// Running containers are skipped with a warning unless `force`.
    pub async fn remove(
        &self,
        project: &Project,
        services: &[String],
        force: bool,
    ) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for service in project.services.values() {
            if !services.is_empty() && !services.contains(&service.name) {
                continue;
            }
            let id = project.container_id(service);
            let summary = match self.runtime.containers.get(&id).await {
                Ok(summary) => summary,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if summary.status.is_running() && !force {
                warn!(container = %id, "container is running, skipping (use force to remove)");
                continue;
            }
            self.remove_container(&id).await?;
            removed.push(id);
        }
        Ok(removed)
    }

    /// Run each selected service's healthcheck once. Services without a
    /// healthcheck report whether their container is running.
    pub async fn check_health(
        &self,
        project: &Project,
        services: &[String],
    ) -> Result<BTreeMap<String, bool>> {
        let mut results = BTreeMap::new();
        for service in project.services.values() {
            if !services.is_empty() && !services.contains(&service.name) {
                continue;
            }
            let id = project.container_id(service);
            let healthy = match self.runtime.containers.get(&id).await {
                Err(_) => false,
                Ok(summary) if !summary.status.is_running() => false,
                Ok(_) => match &service.health_check {
                    Some(check) => {
                        gates::run_healthcheck(self.runtime.containers.as_ref(), &id, check).await
                    }
                    None => true,
                },
            };
            results.insert(service.name.clone(), healthy);
        }
        Ok(results)
    }

    // -- internals ---------------------------------------------------------

    fn filter_services(
        &self,
        project: &Project,
        options: &UpOptions,
    ) -> BTreeMap<String, Service> {
        if options.services.is_empty() {
            return project.services.clone();
        }
        if options.no_deps {
            let mut map = BTreeMap::new();
            for name in &options.services {
                match project.services.get(name) {
                    Some(service) => {
                        map.insert(name.clone(), service.clone());
                    }
                    None => warn!(service = %name, "requested service is not defined; ignoring"),
                }
            }
            // edges to unselected services are dropped so neither the
            // resolver nor the gates reach outside the selection
            let selected: Vec<String> = map.keys().cloned().collect();
            for service in map.values_mut() {
                service.depends_on.retain(|d| selected.contains(d));
                service.depends_on_healthy.retain(|d| selected.contains(d));
                service.depends_on_started.retain(|d| selected.contains(d));
                service.depends_on_completed.retain(|d| selected.contains(d));
            }
            return map;
        }
        resolver::filter_with_dependencies(&project.services, &options.services)
    }

    /// Gate on a service's declared dependency conditions
    async fn wait_for_dependencies(
        &self,
        project: &Project,
        service: &Service,
        options: &UpOptions,
    ) -> Result<()> {
        let containers = self.runtime.containers.as_ref();

        for dep in &service.depends_on_started {
            let id = self.dependency_container_id(project, dep)?;
            gates::wait_started(containers, &id).await?;
        }
        for dep in &service.depends_on_healthy {
            let id = self.dependency_container_id(project, dep)?;
            if options.disable_healthcheck {
                gates::wait_started(containers, &id).await?;
                continue;
            }
            match project.services.get(dep).and_then(|s| s.health_check.as_ref()) {
                Some(check) => gates::wait_healthy(containers, &id, check).await?,
                None => gates::wait_started(containers, &id).await?,
            }
        }
        for dep in &service.depends_on_completed {
            let id = self.dependency_container_id(project, dep)?;
            gates::wait_completed(containers, &id).await?;
        }
        Ok(())
    }

    fn dependency_container_id(&self, project: &Project, dep: &str) -> Result<String> {
        project
            .services
            .get(dep)
            .map(|service| project.container_id(service))
            .ok_or_else(|| Error::not_found(format!("unknown dependency service '{dep}'")))
    }

    /// The `--wait` phase: one deadline over every service
    async fn wait_phase(
        &self,
        project: &Project,
        services: &BTreeMap<String, Service>,
        options: &UpOptions,
    ) -> Result<()> {
        let timeout_seconds = options
            .wait_timeout
            .unwrap_or(gates::DEFAULT_WAIT_TIMEOUT.as_secs());
        let deadline = Instant::now() + std::time::Duration::from_secs(timeout_seconds);
        let containers = self.runtime.containers.as_ref();

        for service in services.values() {
            let id = project.container_id(service);
            let result = match &service.health_check {
                Some(check) if !options.disable_healthcheck => {
                    gates::wait_healthy_until(containers, &id, check, deadline).await
                }
                _ => gates::wait_running_until(containers, &id, deadline).await,
            };
            result.map_err(|e| match e {
                Error::Timeout { .. } => {
                    Error::timeout("services to become ready", timeout_seconds)
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Foreground mode: block until the first SIGINT/SIGTERM, then tear
    /// the project down gracefully; `remove_on_exit` also cleans up the
    /// project's volumes. A second signal during teardown forces exit
    /// with code 130.
    async fn run_foreground(&self, project: &Project, remove_on_exit: bool) -> Result<()> {
        wait_for_shutdown_signal().await;
        info!(project = %project.name, "interrupt received, stopping project");
        let down = DownOptions {
            remove_volumes: remove_on_exit,
            remove_orphans: false,
        };
        let teardown = async {
            if let Err(e) = self.down(project, &down).await {
                warn!(error = %e, "teardown after interrupt failed");
            }
        };
        tokio::select! {
            () = teardown => {}
            () = wait_for_shutdown_signal() => {
                warn!(project = %project.name, "second interrupt received, forcing exit");
                std::process::exit(130);
            }
        }
        Err(Error::Interrupted)
    }

    /// Remove containers whose service no longer exists in the project.
    /// Best effort: failures are logged, never fatal.
    async fn remove_orphans(&self, project: &Project) {
        let containers = match self.runtime.containers.list().await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "cannot list containers for orphan removal");
                return;
            }
        };
        for summary in containers {
            if !self.matches_project(project, &summary, true) {
                continue;
            }
            let service = summary.label(labels::SERVICE).map(ToString::to_string).or_else(|| {
                summary
                    .id
                    .strip_prefix(&format!("{}_", project.name))
                    .map(ToString::to_string)
            });
            let is_orphan = match service {
                Some(name) => !project.services.contains_key(&name),
                None => false,
            };
            if is_orphan {
                info!(container = %summary.id, "removing orphan container");
                if let Err(e) = self.remove_container(&summary.id).await {
                    warn!(container = %summary.id, error = %e, "failed to remove orphan");
                }
            }
        }
    }

    /// Whether a runtime container belongs to this project, by label or
    /// (when allowed) by the `<project>_` name prefix
    fn matches_project(
        &self,
        project: &Project,
        summary: &ContainerSummary,
        allow_prefix: bool,
    ) -> bool {
        match summary.label(labels::PROJECT) {
            Some(name) => name == project.name,
            None => allow_prefix && summary.id.starts_with(&format!("{}_", project.name)),
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

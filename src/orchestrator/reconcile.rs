//! Per-service container reconciliation: reuse or recreate by
//! configuration fingerprint, ensure the image, assemble the runtime
//! configuration, and bring the container up.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::orchestrator::build::effective_image_name;
use crate::orchestrator::state::ContainerRecord;
use crate::orchestrator::{fingerprint, network, volume, Orchestrator, PullPolicy, UpOptions};
use crate::project::{parse_cpus, parse_memory, Project, Service};
use crate::runtime::{
    labels, ContainerConfiguration, ContainerSummary, Image, PublishedPort,
};

/// Default CPU allocation when a service does not request one
const DEFAULT_CPUS: u32 = 4;
/// Default memory limit when a service does not request one
const DEFAULT_MEMORY_BYTES: u64 = 2 * 1024 * 1024 * 1024;
/// Grace period for SIGTERM before escalating
const STOP_GRACE: Duration = Duration::from_secs(15);
/// Settle time after SIGKILL
const KILL_SETTLE: Duration = Duration::from_millis(700);

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

impl Orchestrator {
    /// Reconcile one service: decide reuse versus recreate, make sure
    /// the image is present, and create/bootstrap/start the container.
    pub(crate) async fn reconcile_service(
        &self,
        project: &Project,
        service: &Service,
        options: &UpOptions,
        networks: &BTreeMap<String, String>,
    ) -> Result<()> {
        let id = project.container_id(service);
        let image_name = effective_image_name(&project.name, service);

        let existing = match self.runtime.containers.get(&id).await {
            Ok(summary) => Some(summary),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if let Some(existing) = &existing {
            if options.no_recreate {
                debug!(container = %id, "reusing container (no-recreate)");
                return self.adopt_existing(project, service, existing).await;
            }
            if !options.force_recreate {
                // compare the recorded fingerprint against the expected one;
                // a missing local image forces the recreate path
                if let Ok(image) = self.runtime.images.get(&image_name).await {
                    let (_, expected) = self
                        .assemble_config(project, service, &image, networks, &id)
                        .await?;
                    if existing.label(labels::CONFIG_HASH) == Some(expected.as_str()) {
                        debug!(container = %id, "configuration unchanged, reusing");
                        return self.adopt_existing(project, service, existing).await;
                    }
                }
            }
            info!(container = %id, "recreating container");
            self.remove_container(&id).await?;
        }

        let image = self.ensure_image(service, &image_name, options.pull).await?;

        let (mut config, hash) = self
            .assemble_config(project, service, &image, networks, &id)
            .await?;
        config
            .labels
            .insert(labels::CONFIG_HASH.to_string(), hash.clone());

        match self.runtime.containers.create(&config).await {
            Ok(()) => {}
            Err(Error::AlreadyExists { .. }) => {
                // a concurrent reconciliation won the race; adopt its container
                let summary = self.runtime.containers.get(&id).await?;
                return self.adopt_existing(project, service, &summary).await;
            }
            Err(e) => return Err(e),
        }

        {
            let mut state = self.state.lock().await;
            state.record_container(
                &project.name,
                ContainerRecord {
                    service: service.name.clone(),
                    container_id: id.clone(),
                    config_hash: hash,
                    reused: false,
                },
            );
        }

        self.runtime.containers.bootstrap(&id).await?;
        self.runtime.containers.start(&id).await?;
        info!(container = %id, service = %service.name, "container started");
        Ok(())
    }

    /// Keep an existing container, starting it if it is not running
    async fn adopt_existing(
        &self,
        project: &Project,
        service: &Service,
        summary: &ContainerSummary,
    ) -> Result<()> {
        if !summary.status.is_running() {
            self.runtime.containers.bootstrap(&summary.id).await?;
            self.runtime.containers.start(&summary.id).await?;
        }
        let mut state = self.state.lock().await;
        state.record_container(
            &project.name,
            ContainerRecord {
                service: service.name.clone(),
                container_id: summary.id.clone(),
                config_hash: summary
                    .label(labels::CONFIG_HASH)
                    .unwrap_or_default()
                    .to_string(),
                reused: true,
            },
        );
        Ok(())
    }

    /// Graceful stop ladder, then delete: SIGTERM, wait for the status
    /// to leave running, escalate to SIGKILL on timeout, delete with a
    /// forced retry
    pub(crate) async fn remove_container(&self, id: &str) -> Result<()> {
        let containers = &self.runtime.containers;
        if let Err(e) = containers.kill(id, SIGTERM).await {
            debug!(container = %id, error = %e, "SIGTERM delivery failed");
        }

        let deadline = Instant::now() + STOP_GRACE;
        let stopped = loop {
            match containers.get(id).await {
                Ok(summary) if !summary.status.is_running() => break true,
                Err(e) if e.is_not_found() => break true,
                Err(_) | Ok(_) => {}
            }
            if Instant::now() >= deadline {
                break false;
            }
            sleep(Duration::from_millis(500)).await;
        };

        if !stopped {
            warn!(container = %id, "graceful stop timed out, sending SIGKILL");
            if let Err(e) = containers.kill(id, SIGKILL).await {
                debug!(container = %id, error = %e, "SIGKILL delivery failed");
            }
            sleep(KILL_SETTLE).await;
        }

        match containers.delete(id, false).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(_) => containers.delete(id, true).await,
        }
    }

    /// Make the image available per the pull policy. Built services must
    /// already have their image from the build phase.
    async fn ensure_image(
        &self,
        service: &Service,
        image_name: &str,
        pull: PullPolicy,
    ) -> Result<Image> {
        if service.build.is_some() {
            return self.runtime.images.get(image_name).await.map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(format!(
                        "built image '{image_name}' for service '{}' is missing",
                        service.name
                    ))
                } else {
                    e
                }
            });
        }
        match pull {
            PullPolicy::Always => self.runtime.images.fetch(image_name).await,
            PullPolicy::Missing => match self.runtime.images.get(image_name).await {
                Ok(image) => Ok(image),
                Err(e) if e.is_not_found() => self.runtime.images.fetch(image_name).await,
                Err(e) => Err(e),
            },
            PullPolicy::Never => self.runtime.images.get(image_name).await,
        }
    }

    /// Assemble the full container configuration and its fingerprint
    pub(crate) async fn assemble_config(
        &self,
        project: &Project,
        service: &Service,
        image: &Image,
        networks: &BTreeMap<String, String>,
        id: &str,
    ) -> Result<(ContainerConfiguration, String)> {
        let exec = effective_exec(service, image);
        let working_dir = service
            .working_dir
            .clone()
            .or_else(|| image.config.working_dir.clone());

        let cpus = match &service.cpus {
            Some(raw) => parse_cpus(raw)?,
            None => DEFAULT_CPUS,
        };
        let memory_bytes = match &service.memory {
            Some(raw) => parse_memory(raw)?.unwrap_or(DEFAULT_MEMORY_BYTES),
            None => DEFAULT_MEMORY_BYTES,
        };

        let published_ports: Vec<PublishedPort> = service
            .ports
            .iter()
            .map(|p| PublishedPort {
                host_address: p.host_ip.clone().unwrap_or_else(|| "0.0.0.0".to_string()),
                host_port: p.host_port,
                container_port: p.container_port,
                protocol: p.protocol,
            })
            .collect();

        let resolved =
            volume::resolve_mounts(self.runtime.volumes.as_ref(), project, service).await?;
        let mount_keys: Vec<String> = resolved
            .iter()
            .map(|m| fingerprint::mount_key(&m.spec, Some(&m.logical_source)))
            .collect();
        let mounts = resolved.into_iter().map(|m| m.spec).collect();

        let attachments = network::attachments_for(
            self.runtime.networks.as_ref(),
            service,
            networks,
            id,
        )
        .await?;

        let mut config = ContainerConfiguration {
            id: id.to_string(),
            image: image.reference.clone(),
            exec,
            working_dir,
            environment: service.environment.clone(),
            labels: BTreeMap::new(),
            published_ports,
            mounts,
            networks: attachments,
            cpus,
            memory_bytes,
            tty: service.tty,
        };

        let hash = fingerprint::config_hash(&config, &mount_keys, &service.labels, service.health_check.as_ref())?;

        let mut all_labels = service.labels.clone();
        all_labels.insert(labels::PROJECT.to_string(), project.name.clone());
        all_labels.insert(labels::SERVICE.to_string(), service.name.clone());
        all_labels.insert(labels::CONTAINER.to_string(), id.to_string());
        config.labels = all_labels;

        Ok((config, hash))
    }
}

/// Entrypoint/command precedence: the image provides the base, a
/// non-empty service entrypoint overrides, a single empty string clears,
/// and the service command replaces the image cmd
fn effective_exec(service: &Service, image: &Image) -> Vec<String> {
    let entrypoint = match &service.entrypoint {
        Some(ep) if ep.len() == 1 && ep[0].is_empty() => Vec::new(),
        Some(ep) if !ep.is_empty() => ep.clone(),
        _ => image.config.entrypoint.clone(),
    };
    let command = match &service.command {
        Some(command) => command.clone(),
        None => image.config.cmd.clone(),
    };
    let mut exec = entrypoint;
    exec.extend(command);
    exec
}

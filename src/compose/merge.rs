//! Multi-file merging with Docker Compose precedence rules.
//!
//! Later files override earlier ones. Scalars replace, environment and
//! labels merge per key, and list-shaped fields (ports, volumes,
//! networks, depends_on, env_file, profiles) replace wholesale.

use std::collections::BTreeMap;

use crate::compose::{ComposeFile, ComposeService, Environment, Labels};

/// Merge an ordered list of compose files into one document
pub fn merge_files(files: Vec<ComposeFile>) -> ComposeFile {
    let mut iter = files.into_iter();
    let Some(mut merged) = iter.next() else {
        return ComposeFile::default();
    };
    for file in iter {
        merged = merge_pair(merged, file);
    }
    merged
}

fn merge_pair(base: ComposeFile, overlay: ComposeFile) -> ComposeFile {
    let mut services = base.services;
    for (name, overlay_service) in overlay.services {
        match services.remove(&name) {
            Some(base_service) => {
                services.insert(name, merge_service(base_service, overlay_service));
            }
            None => {
                services.insert(name, overlay_service);
            }
        }
    }

    let mut networks = base.networks;
    networks.extend(overlay.networks);
    let mut volumes = base.volumes;
    volumes.extend(overlay.volumes);
    let mut extra = base.extra;
    extra.extend(overlay.extra);

    ComposeFile {
        version: overlay.version.or(base.version),
        services,
        networks,
        volumes,
        extra,
    }
}

fn merge_service(base: ComposeService, overlay: ComposeService) -> ComposeService {
    ComposeService {
        image: overlay.image.or(base.image),
        build: overlay.build.or(base.build),
        command: overlay.command.or(base.command),
        entrypoint: overlay.entrypoint.or(base.entrypoint),
        working_dir: overlay.working_dir.or(base.working_dir),
        environment: merge_environment(base.environment, overlay.environment),
        env_file: overlay.env_file.or(base.env_file),
        ports: overlay.ports.or(base.ports),
        volumes: overlay.volumes.or(base.volumes),
        networks: overlay.networks.or(base.networks),
        depends_on: overlay.depends_on.or(base.depends_on),
        healthcheck: overlay.healthcheck.or(base.healthcheck),
        deploy: overlay.deploy.or(base.deploy),
        restart: overlay.restart.or(base.restart),
        container_name: overlay.container_name.or(base.container_name),
        profiles: overlay.profiles.or(base.profiles),
        labels: merge_labels(base.labels, overlay.labels),
        cpus: overlay.cpus.or(base.cpus),
        memory: overlay.memory.or(base.memory),
        tty: overlay.tty.or(base.tty),
        stdin_open: overlay.stdin_open.or(base.stdin_open),
        extends: overlay.extends.or(base.extends),
    }
}

/// Per-key merge with the overlay winning; both shapes canonicalize to
/// the map form
fn merge_environment(
    base: Option<Environment>,
    overlay: Option<Environment>,
) -> Option<Environment> {
    merge_string_maps(
        base.map(|e| e.to_map()),
        overlay.map(|e| e.to_map()),
    )
    .map(|map| {
        Environment::Map(
            map.into_iter()
                .map(|(k, v)| (k, Some(serde_yaml::Value::String(v))))
                .collect(),
        )
    })
}

fn merge_labels(base: Option<Labels>, overlay: Option<Labels>) -> Option<Labels> {
    merge_string_maps(base.map(|l| l.to_map()), overlay.map(|l| l.to_map())).map(|map| {
        Labels::Map(
            map.into_iter()
                .map(|(k, v)| (k, Some(serde_yaml::Value::String(v))))
                .collect(),
        )
    })
}

fn merge_string_maps(
    base: Option<BTreeMap<String, String>>,
    overlay: Option<BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (base, overlay) {
        (Some(mut base), Some(overlay)) => {
            base.extend(overlay);
            Some(base)
        }
        (base, overlay) => overlay.or(base),
    }
}

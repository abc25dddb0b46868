//! Configuration fingerprinting for recreate decisions.
//!
//! The fingerprint is a SHA-256 over a canonical JSON document of the
//! effective runtime configuration. Maps and repeated fields are sorted
//! before serialization so two configurations that differ only in
//! iteration order hash identically.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::project::HealthCheck;
use crate::runtime::{ContainerConfiguration, MountSpec};

/// Canonical fingerprint document; field order is fixed by the struct
#[derive(Debug, Serialize)]
struct CanonicalConfig<'a> {
    image: &'a str,
    executable: Option<&'a str>,
    arguments: &'a [String],
    workdir: Option<&'a str>,
    environment: BTreeMap<&'a str, &'a str>,
    cpus: u32,
    memory: u64,
    ports: Vec<String>,
    mounts: Vec<String>,
    labels: BTreeMap<&'a str, &'a str>,
    healthcheck: Option<CanonicalHealthCheck<'a>>,
}

#[derive(Debug, Serialize)]
struct CanonicalHealthCheck<'a> {
    test: &'a [String],
    interval_seconds: Option<u64>,
    timeout_seconds: Option<u64>,
    retries: Option<u32>,
    start_period_seconds: Option<u64>,
}

/// Compute the configuration fingerprint for a container.
///
/// `user_labels` are the service's own labels; the compose bookkeeping
/// labels (including the hash itself) never participate. Mount sources
/// for managed volumes must already be the logical volume names so host
/// path churn cannot invalidate the hash.
pub fn config_hash(
    config: &ContainerConfiguration,
    mount_keys: &[String],
    user_labels: &BTreeMap<String, String>,
    healthcheck: Option<&HealthCheck>,
) -> Result<String> {
    let mut ports: Vec<String> = config
        .published_ports
        .iter()
        .map(|p| {
            format!(
                "{}:{}->{}/{}",
                p.host_address, p.host_port, p.container_port, p.protocol
            )
        })
        .collect();
    ports.sort();

    let mut mounts = mount_keys.to_vec();
    mounts.sort();

    let doc = CanonicalConfig {
        image: &config.image,
        executable: config.exec.first().map(String::as_str),
        arguments: config.exec.get(1..).unwrap_or_default(),
        workdir: config.working_dir.as_deref(),
        environment: config
            .environment
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect(),
        cpus: config.cpus,
        memory: config.memory_bytes,
        ports,
        mounts,
        labels: user_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect(),
        healthcheck: healthcheck.map(|check| CanonicalHealthCheck {
            test: &check.test,
            interval_seconds: check.interval.map(|d| d.as_secs()),
            timeout_seconds: check.timeout.map(|d| d.as_secs()),
            retries: check.retries,
            start_period_seconds: check.start_period.map(|d| d.as_secs()),
        }),
    };

    let canonical = serde_json::to_vec(&doc)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Stable identity of one mount for hashing: `dest=source:options`.
///
/// For managed volumes `source` is the logical volume name; for binds it
/// is the absolute host path.
pub fn mount_key(mount: &MountSpec, logical_source: Option<&str>) -> String {
    match mount {
        MountSpec::Virtiofs {
            source,
            destination,
            read_only,
        } => format!(
            "{destination}={source}:{}",
            if *read_only { "ro" } else { "rw" }
        ),
        MountSpec::Block {
            destination,
            read_only,
            ..
        } => format!(
            "{destination}={}:{}",
            logical_source.unwrap_or_default(),
            if *read_only { "ro" } else { "rw" }
        ),
        MountSpec::Tmpfs { destination } => format!("{destination}=tmpfs"),
    }
}

//! Volume mount resolution: binds, tmpfs, and managed volumes with
//! idempotent create-if-absent semantics and deterministic anonymous
//! naming.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::project::{MountKind, Project, Service, VolumeMount};
use crate::runtime::{labels, MountSpec, VolumeClient};

/// A resolved mount plus the logical source used for fingerprinting
#[derive(Debug, Clone)]
pub struct ResolvedMount {
    /// Mount handed to the runtime
    pub spec: MountSpec,
    /// Logical volume name for managed volumes, host path for binds
    pub logical_source: String,
}

/// Deterministic name for an anonymous volume:
/// `<project>_<service>_anon_<12 hex of SHA-256(target)>`, sanitized to
/// `[A-Za-z0-9_.-]`
pub fn anonymous_volume_name(project: &str, service: &str, target: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    let digest = hex::encode(hasher.finalize());
    let raw = format!("{project}_{service}_anon_{}", &digest[..12]);
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Resolve every mount of a service into runtime mount specs, creating
/// managed volumes on first use
pub async fn resolve_mounts(
    volumes: &dyn VolumeClient,
    project: &Project,
    service: &Service,
) -> Result<Vec<ResolvedMount>> {
    let mut resolved = Vec::with_capacity(service.volumes.len());
    for mount in &service.volumes {
        resolved.push(resolve_mount(volumes, project, service, mount).await?);
    }
    Ok(resolved)
}

async fn resolve_mount(
    volumes: &dyn VolumeClient,
    project: &Project,
    service: &Service,
    mount: &VolumeMount,
) -> Result<ResolvedMount> {
    match mount.kind {
        MountKind::Bind => Ok(ResolvedMount {
            spec: MountSpec::Virtiofs {
                source: mount.source.clone(),
                destination: mount.target.clone(),
                read_only: mount.read_only,
            },
            logical_source: mount.source.clone(),
        }),
        MountKind::Tmpfs => Ok(ResolvedMount {
            spec: MountSpec::Tmpfs {
                destination: mount.target.clone(),
            },
            logical_source: String::new(),
        }),
        MountKind::Volume => {
            let anonymous = mount.source.is_empty();
            let name = if anonymous {
                anonymous_volume_name(&project.name, &service.name, &mount.target)
            } else {
                mount.source.clone()
            };
            let external = project
                .volumes
                .get(&name)
                .map(|v| v.external)
                .unwrap_or(false);

            let record = match volumes.inspect(&name).await {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    if external {
                        return Err(Error::not_found(format!(
                            "external volume '{name}' does not exist"
                        )));
                    }
                    debug!(volume = %name, "creating volume");
                    let volume_labels = volume_labels(project, service, mount, anonymous);
                    volumes.create(&name, &volume_labels).await?
                }
                Err(e) => return Err(e),
            };

            Ok(ResolvedMount {
                spec: MountSpec::Block {
                    source: record.source,
                    destination: mount.target.clone(),
                    format: record.format,
                    read_only: mount.read_only,
                },
                logical_source: name,
            })
        }
    }
}

fn volume_labels(
    project: &Project,
    service: &Service,
    mount: &VolumeMount,
    anonymous: bool,
) -> BTreeMap<String, String> {
    [
        (labels::PROJECT.to_string(), project.name.clone()),
        (labels::SERVICE.to_string(), service.name.clone()),
        (labels::TARGET.to_string(), mount.target.clone()),
        (labels::ANONYMOUS.to_string(), anonymous.to_string()),
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_name_shape() {
        let name = anonymous_volume_name("proj", "app", "/cache");
        assert!(name.starts_with("proj_app_anon_"));
        let suffix = name.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_anonymous_name_deterministic() {
        let a = anonymous_volume_name("proj", "app", "/cache");
        let b = anonymous_volume_name("proj", "app", "/cache");
        assert_eq!(a, b);

        let other_target = anonymous_volume_name("proj", "app", "/data");
        assert_ne!(a, other_target);
    }

    #[test]
    fn test_anonymous_name_sanitized() {
        let name = anonymous_volume_name("pro j", "ap/p", "/cache");
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'));
    }
}

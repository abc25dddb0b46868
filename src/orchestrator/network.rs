//! Project network management: ensure declared networks exist, map
//! declared names to runtime IDs, and build per-service attachments.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::project::{Project, Service};
use crate::runtime::{NetworkAttachment, NetworkClient, NetworkMode};

/// Ensure every project network exists and return the declared-name to
/// runtime-ID mapping.
///
/// External networks must already exist; project-scoped ones are
/// created in NAT mode under `<project>_<name>`. Only the bridge driver
/// is supported.
pub async fn ensure_networks(
    networks: &dyn NetworkClient,
    project: &Project,
) -> Result<BTreeMap<String, String>> {
    let mut mapping = BTreeMap::new();

    for (name, network) in &project.networks {
        if network.driver != "bridge" {
            return Err(Error::invalid_argument(format!(
                "network '{name}': unsupported driver '{}' (only bridge is supported)",
                network.driver
            )));
        }

        let runtime_id = if network.external {
            network.external_name.clone().unwrap_or_else(|| name.clone())
        } else {
            format!("{}_{name}", project.name)
        };

        match networks.get(&runtime_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                if network.external {
                    return Err(Error::not_found(format!(
                        "external network '{runtime_id}' does not exist"
                    )));
                }
                debug!(network = %runtime_id, "creating network");
                networks.create(&runtime_id, NetworkMode::Nat).await?;
            }
            Err(e) => return Err(e),
        }

        mapping.insert(name.clone(), runtime_id);
    }

    Ok(mapping)
}

/// Build the attachment list for one container, preserving the service's
/// declared network order. A service with no declared networks falls
/// back to the runtime's default network.
pub async fn attachments_for(
    networks: &dyn NetworkClient,
    service: &Service,
    mapping: &BTreeMap<String, String>,
    container_id: &str,
) -> Result<Vec<NetworkAttachment>> {
    if service.networks.is_empty() {
        let Some(default) = networks.default_network().await? else {
            return Ok(Vec::new());
        };
        return Ok(vec![NetworkAttachment {
            network: default,
            hostname: Some(container_id.to_string()),
        }]);
    }

    let mut attachments = Vec::with_capacity(service.networks.len());
    for name in &service.networks {
        let runtime_id = mapping.get(name).ok_or_else(|| {
            Error::not_found(format!(
                "service '{}' references unknown network '{name}'",
                service.name
            ))
        })?;
        attachments.push(NetworkAttachment {
            network: runtime_id.clone(),
            hostname: Some(container_id.to_string()),
        });
    }
    Ok(attachments)
}

//! Conversion from the merged compose AST into the canonical project
//! model: `extends` resolution, profile and selection filtering, and
//! normalization of ports, volumes, environment, and healthchecks.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::warn;

use crate::compose::{
    BuildSpec, ComposeFile, ComposeLoadOptions, ComposeService, HealthCheckSpec, StringOrList,
    VolumeEntry, CONDITION_COMPLETED, CONDITION_HEALTHY, CONDITION_STARTED,
};
use crate::error::{Error, Result};
use crate::project::{
    parse_duration, BuildConfig, DeployConfig, HealthCheck, MountKind, Network, PortMapping,
    Project, Service, Volume, VolumeMount,
};

/// Run the conversion stages over a merged document
pub fn convert(
    file: ComposeFile,
    project_name: &str,
    base_dir: &Path,
    options: &ComposeLoadOptions,
) -> Result<Project> {
    let services = resolve_extends(&file.services)?;
    let services = filter_profiles(services, &options.profiles);
    let services = filter_selection(services, &options.services);

    let mut project = Project {
        name: project_name.to_string(),
        ..Project::default()
    };

    for (name, ast) in &services {
        let service = normalize_service(name, ast, base_dir)?;
        if service.image.is_none() && service.build.is_none() {
            return Err(Error::invalid_argument(format!(
                "service '{name}' needs either an image or a build section"
            )));
        }
        project.services.insert(name.clone(), service);
    }

    check_dependencies_present(&project)?;

    project.networks = convert_networks(&file);
    project.volumes = convert_volumes(&file);
    ensure_default_network(&mut project)?;

    Ok(project)
}

// ---------------------------------------------------------------------------
// Stage 1: extends
// ---------------------------------------------------------------------------

fn resolve_extends(
    services: &BTreeMap<String, ComposeService>,
) -> Result<BTreeMap<String, ComposeService>> {
    let mut resolved: BTreeMap<String, ComposeService> = BTreeMap::new();
    for name in services.keys() {
        let mut resolving = Vec::new();
        resolve_one(name, services, &mut resolved, &mut resolving)?;
    }
    Ok(resolved)
}

fn resolve_one(
    name: &str,
    services: &BTreeMap<String, ComposeService>,
    resolved: &mut BTreeMap<String, ComposeService>,
    resolving: &mut Vec<String>,
) -> Result<ComposeService> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }
    if resolving.iter().any(|n| n == name) {
        let start = resolving.iter().position(|n| n == name).unwrap_or(0);
        let mut cycle: Vec<&str> = resolving[start..].iter().map(String::as_str).collect();
        cycle.push(name);
        return Err(Error::invalid_argument(format!(
            "extends cycle: {}",
            cycle.join(" → ")
        )));
    }

    let service = services
        .get(name)
        .ok_or_else(|| Error::not_found(format!("extends references unknown service '{name}'")))?
        .clone();

    let merged = match service.extends.clone() {
        Some(pointer) => {
            resolving.push(name.to_string());
            let base = resolve_one(&pointer.service, services, resolved, resolving)?;
            resolving.pop();
            merge_extended(base, service)
        }
        None => service,
    };

    resolved.insert(name.to_string(), merged.clone());
    Ok(merged)
}

/// `extends` merge policy: scalars overridden, list-shaped fields
/// concatenated (base then derived), env and labels merged with the
/// derived service winning; the extends pointer is cleared
fn merge_extended(base: ComposeService, derived: ComposeService) -> ComposeService {
    let concat_volumes = concat_option(base.volumes.clone(), derived.volumes.clone());
    let concat_ports = concat_option(base.ports.clone(), derived.ports.clone());
    let concat_profiles = concat_option(base.profiles.clone(), derived.profiles.clone());
    let concat_env_file = match (base.env_file.clone(), derived.env_file.clone()) {
        (Some(base), Some(derived)) => {
            let mut items = base.to_vec();
            items.extend(derived.to_vec());
            Some(StringOrList::List(items))
        }
        (base, derived) => derived.or(base),
    };

    let mut merged = crate::compose::merge::merge_files(vec![
        wrap_service(base),
        wrap_service(derived),
    ])
    .services
    .remove("it")
    .unwrap_or_default();

    merged.volumes = concat_volumes;
    merged.ports = concat_ports;
    merged.profiles = concat_profiles;
    merged.env_file = concat_env_file;
    merged.extends = None;
    merged
}

fn wrap_service(service: ComposeService) -> ComposeFile {
    let mut file = ComposeFile::default();
    file.services.insert("it".to_string(), service);
    file
}

fn concat_option<T>(base: Option<Vec<T>>, derived: Option<Vec<T>>) -> Option<Vec<T>> {
    match (base, derived) {
        (Some(mut base), Some(derived)) => {
            base.extend(derived);
            Some(base)
        }
        (base, derived) => derived.or(base),
    }
}

// ---------------------------------------------------------------------------
// Stage 2 + 3: profile and selection filters
// ---------------------------------------------------------------------------

fn filter_profiles(
    services: BTreeMap<String, ComposeService>,
    active: &[String],
) -> BTreeMap<String, ComposeService> {
    services
        .into_iter()
        .filter(|(_, service)| match &service.profiles {
            None => true,
            Some(profiles) if profiles.is_empty() => true,
            Some(profiles) => {
                !active.is_empty() && profiles.iter().any(|p| active.contains(p))
            }
        })
        .collect()
}

fn filter_selection(
    services: BTreeMap<String, ComposeService>,
    requested: &[String],
) -> BTreeMap<String, ComposeService> {
    if requested.is_empty() {
        return services;
    }

    let mut keep: HashSet<String> = HashSet::new();
    let mut queue: Vec<String> = Vec::new();
    for name in requested {
        if services.contains_key(name) {
            queue.push(name.clone());
        } else {
            warn!(service = %name, "requested service is not defined; ignoring");
        }
    }

    while let Some(name) = queue.pop() {
        if !keep.insert(name.clone()) {
            continue;
        }
        if let Some(service) = services.get(&name) {
            if let Some(deps) = &service.depends_on {
                for dep in deps.names() {
                    if services.contains_key(&dep) {
                        queue.push(dep);
                    }
                }
            }
        }
    }

    services
        .into_iter()
        .filter(|(name, _)| keep.contains(name))
        .collect()
}

// ---------------------------------------------------------------------------
// Stage 4: normalization
// ---------------------------------------------------------------------------

fn normalize_service(name: &str, ast: &ComposeService, base_dir: &Path) -> Result<Service> {
    let mut service = Service {
        name: name.to_string(),
        image: ast.image.clone(),
        build: ast.build.as_ref().map(convert_build),
        command: ast.command.as_ref().map(StringOrList::to_command),
        entrypoint: ast.entrypoint.as_ref().map(normalize_entrypoint),
        working_dir: ast.working_dir.clone(),
        restart: ast.restart.clone(),
        container_name: ast.container_name.clone(),
        profiles: ast.profiles.clone().unwrap_or_default(),
        tty: ast.tty.unwrap_or(false),
        stdin_open: ast.stdin_open.unwrap_or(false),
        ..Service::default()
    };

    // env_file first, service-level environment overrides
    let mut environment = BTreeMap::new();
    if let Some(env_files) = &ast.env_file {
        for entry in env_files.to_vec() {
            let pairs = crate::compose::env_file::read_env_file(&entry, base_dir)
                .map_err(|e| match e {
                    Error::NotFound { message } => {
                        Error::not_found(format!("service '{name}': {message}"))
                    }
                    other => other,
                })?;
            environment.extend(pairs);
        }
    }
    if let Some(env) = &ast.environment {
        environment.extend(env.to_map());
    }
    service.environment = environment;

    if let Some(ports) = &ast.ports {
        for spec in ports {
            service.ports.extend(PortMapping::parse(spec)?);
        }
    }

    if let Some(volumes) = &ast.volumes {
        for entry in volumes {
            service.volumes.push(normalize_volume(name, entry)?);
        }
    }

    service.networks = ast
        .networks
        .as_ref()
        .map(|n| n.names())
        .filter(|names| !names.is_empty())
        .unwrap_or_else(|| vec!["default".to_string()]);

    if let Some(deps) = &ast.depends_on {
        normalize_depends_on(name, deps, &mut service)?;
    }

    service.health_check = match &ast.healthcheck {
        Some(spec) => normalize_healthcheck(name, spec)?,
        None => None,
    };

    if let Some(labels) = &ast.labels {
        service.labels = labels.to_map();
    }

    let deploy_limits = ast
        .deploy
        .as_ref()
        .and_then(|d| d.resources.as_ref())
        .and_then(|r| r.limits.as_ref());
    service.cpus = ast
        .cpus
        .as_ref()
        .map(|c| c.as_string())
        .or_else(|| deploy_limits.and_then(|l| l.cpus.as_ref()).map(|c| c.as_string()));
    service.memory = ast
        .memory
        .as_ref()
        .map(|m| m.as_string())
        .or_else(|| deploy_limits.and_then(|l| l.memory.as_ref()).map(|m| m.as_string()));
    if deploy_limits.is_some() {
        service.deploy = Some(DeployConfig {
            cpus: deploy_limits.and_then(|l| l.cpus.as_ref()).map(|c| c.as_string()),
            memory: deploy_limits.and_then(|l| l.memory.as_ref()).map(|m| m.as_string()),
        });
    }

    Ok(service)
}

/// `entrypoint: ''` means "clear the image entrypoint" and must survive
/// as a single empty string rather than an empty list
fn normalize_entrypoint(value: &StringOrList) -> Vec<String> {
    match value {
        StringOrList::String(s) if s.is_empty() => vec![String::new()],
        other => other.to_command(),
    }
}

fn convert_build(spec: &BuildSpec) -> BuildConfig {
    match spec {
        BuildSpec::Short(context) => BuildConfig {
            context: Some(context.clone()),
            ..BuildConfig::default()
        },
        BuildSpec::Full {
            context,
            dockerfile,
            args,
            target,
        } => BuildConfig {
            context: context.clone(),
            dockerfile: dockerfile.clone(),
            args: args.as_ref().map(|a| a.to_map()).unwrap_or_default(),
            target: target.clone(),
        },
    }
}

fn normalize_volume(service: &str, entry: &VolumeEntry) -> Result<VolumeMount> {
    let mut mount = match entry {
        VolumeEntry::Short(spec) => VolumeMount::parse_short(spec)
            .map_err(|e| Error::invalid_argument(format!("service '{service}': {e}")))?,
        VolumeEntry::Long(long) => {
            let kind = match long.kind.as_deref() {
                None | Some("volume") => MountKind::Volume,
                Some("bind") => MountKind::Bind,
                Some("tmpfs") => MountKind::Tmpfs,
                Some(other) => {
                    return Err(Error::invalid_argument(format!(
                        "service '{service}': unsupported volume type '{other}'"
                    )))
                }
            };
            VolumeMount {
                kind,
                source: long.source.clone().unwrap_or_default(),
                target: long.target.clone(),
                read_only: long.read_only,
            }
        }
    };

    if mount.kind == MountKind::Bind {
        mount.source = absolutize_bind_source(&mount.source);
    }
    Ok(mount)
}

/// Expand `~` and anchor relative bind sources at the current working
/// directory
fn absolutize_bind_source(source: &str) -> String {
    if source == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().into_owned();
        }
    }
    if let Some(rest) = source.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    let path = Path::new(source);
    if path.is_absolute() {
        return source.to_string();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path).to_string_lossy().into_owned(),
        Err(_) => source.to_string(),
    }
}

fn normalize_depends_on(
    name: &str,
    deps: &crate::compose::DependsOn,
    service: &mut Service,
) -> Result<()> {
    match deps {
        crate::compose::DependsOn::List(names) => {
            service.depends_on = names.clone();
        }
        crate::compose::DependsOn::Map(map) => {
            for (dep, entry) in map {
                match entry.as_ref().and_then(|e| e.condition.as_deref()) {
                    None | Some(CONDITION_STARTED) => {
                        service.depends_on_started.push(dep.clone());
                    }
                    Some(CONDITION_HEALTHY) => service.depends_on_healthy.push(dep.clone()),
                    Some(CONDITION_COMPLETED) => service.depends_on_completed.push(dep.clone()),
                    Some(other) => {
                        return Err(Error::invalid_argument(format!(
                            "service '{name}': unknown depends_on condition '{other}'"
                        )))
                    }
                }
            }
        }
    }
    Ok(())
}

fn normalize_healthcheck(
    name: &str,
    spec: &HealthCheckSpec,
) -> Result<Option<HealthCheck>> {
    if spec.disable == Some(true) {
        return Ok(None);
    }
    let Some(test) = &spec.test else {
        return Ok(None);
    };

    let test = match test {
        StringOrList::String(s) => {
            vec!["/bin/sh".to_string(), "-c".to_string(), s.clone()]
        }
        StringOrList::List(items) => match items.first().map(String::as_str) {
            Some("NONE") => return Ok(None),
            Some("CMD-SHELL") => {
                let script = items.get(1).cloned().unwrap_or_default();
                vec!["/bin/sh".to_string(), "-c".to_string(), script]
            }
            Some("CMD") => items[1..].to_vec(),
            _ => items.clone(),
        },
    };

    let parse = |field: &Option<String>, what: &str| -> Result<Option<std::time::Duration>> {
        field
            .as_ref()
            .map(|s| {
                parse_duration(s).map_err(|e| {
                    Error::invalid_argument(format!("service '{name}' healthcheck {what}: {e}"))
                })
            })
            .transpose()
    };

    Ok(Some(HealthCheck {
        test,
        interval: parse(&spec.interval, "interval")?,
        timeout: parse(&spec.timeout, "timeout")?,
        retries: spec.retries,
        start_period: parse(&spec.start_period, "start_period")?,
    }))
}

// ---------------------------------------------------------------------------
// Project-level pieces
// ---------------------------------------------------------------------------

fn convert_networks(file: &ComposeFile) -> BTreeMap<String, Network> {
    file.networks
        .iter()
        .map(|(name, block)| {
            let block = block.clone().unwrap_or_default();
            let external = block.external.as_ref().is_some_and(|e| e.is_external());
            let external_name = block
                .external
                .as_ref()
                .and_then(|e| e.name().map(ToString::to_string))
                .or_else(|| block.name.clone());
            (
                name.clone(),
                Network {
                    name: name.clone(),
                    driver: block.driver.unwrap_or_else(|| "bridge".to_string()),
                    external,
                    external_name: if external { external_name } else { None },
                },
            )
        })
        .collect()
}

fn convert_volumes(file: &ComposeFile) -> BTreeMap<String, Volume> {
    file.volumes
        .iter()
        .map(|(name, block)| {
            let block = block.clone().unwrap_or_default();
            (
                name.clone(),
                Volume {
                    name: name.clone(),
                    driver: block.driver.unwrap_or_else(|| "local".to_string()),
                    external: block.external.as_ref().is_some_and(|e| e.is_external()),
                },
            )
        })
        .collect()
}

/// Synthesize the default bridge network when absent and make sure every
/// network a service names is declared
fn ensure_default_network(project: &mut Project) -> Result<()> {
    let referenced: HashSet<String> = project
        .services
        .values()
        .flat_map(|s| s.networks.iter().cloned())
        .collect();

    if !project.networks.contains_key("default")
        && (referenced.contains("default") || project.networks.is_empty())
    {
        project.networks.insert(
            "default".to_string(),
            Network {
                name: "default".to_string(),
                driver: "bridge".to_string(),
                external: false,
                external_name: None,
            },
        );
    }

    for name in referenced {
        if !project.networks.contains_key(&name) {
            return Err(Error::invalid_argument(format!(
                "service network '{name}' is not declared under networks"
            )));
        }
    }
    Ok(())
}

fn check_dependencies_present(project: &Project) -> Result<()> {
    for service in project.services.values() {
        for dep in service.all_dependencies() {
            if !project.services.contains_key(dep) {
                return Err(Error::not_found(format!(
                    "service '{}' depends on '{dep}', which is not part of the project",
                    service.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::parser::parse_compose_text;

    fn convert_text(text: &str) -> Result<Project> {
        let file = parse_compose_text(text, false).unwrap();
        convert(
            file,
            "proj",
            Path::new("/tmp"),
            &ComposeLoadOptions::default(),
        )
    }

    fn convert_with(text: &str, options: &ComposeLoadOptions) -> Result<Project> {
        let file = parse_compose_text(text, false).unwrap();
        convert(file, "proj", Path::new("/tmp"), options)
    }

    #[test]
    fn test_extends_merges_base() {
        let project = convert_text(
            "services:\n  base:\n    image: app\n    environment:\n      MODE: base\n      KEEP: y\n    ports: [\"80:80\"]\n  derived:\n    extends:\n      service: base\n    environment:\n      MODE: derived\n    ports: [\"443:443\"]\n",
        )
        .unwrap();
        let derived = &project.services["derived"];
        assert_eq!(derived.image.as_deref(), Some("app"));
        assert_eq!(derived.environment.get("MODE").unwrap(), "derived");
        assert_eq!(derived.environment.get("KEEP").unwrap(), "y");
        // base ports come first, derived appended
        assert_eq!(derived.ports.len(), 2);
        assert_eq!(derived.ports[0].host_port, 80);
        assert_eq!(derived.ports[1].host_port, 443);
    }

    #[test]
    fn test_extends_cycle_reports_path() {
        let err = convert_text(
            "services:\n  a:\n    image: x\n    extends: {service: b}\n  b:\n    image: x\n    extends: {service: a}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("extends cycle"));
        assert!(err.to_string().contains("→"));
    }

    #[test]
    fn test_profiles_empty_set_keeps_unprofiled_only() {
        let project = convert_text(
            "services:\n  web:\n    image: nginx\n  debug:\n    image: busybox\n    profiles: [debug]\n",
        )
        .unwrap();
        assert!(project.services.contains_key("web"));
        assert!(!project.services.contains_key("debug"));
    }

    #[test]
    fn test_profiles_active_set() {
        let options = ComposeLoadOptions {
            profiles: vec!["debug".to_string()],
            ..ComposeLoadOptions::default()
        };
        let project = convert_with(
            "services:\n  web:\n    image: nginx\n  debug:\n    image: busybox\n    profiles: [debug]\n  other:\n    image: x\n    profiles: [metrics]\n",
            &options,
        )
        .unwrap();
        assert!(project.services.contains_key("web"));
        assert!(project.services.contains_key("debug"));
        assert!(!project.services.contains_key("other"));
    }

    #[test]
    fn test_selection_pulls_dependencies() {
        let options = ComposeLoadOptions {
            services: vec!["web".to_string()],
            ..ComposeLoadOptions::default()
        };
        let project = convert_with(
            "services:\n  db:\n    image: pg\n  web:\n    image: nginx\n    depends_on: [db]\n  stray:\n    image: x\n",
            &options,
        )
        .unwrap();
        assert!(project.services.contains_key("web"));
        assert!(project.services.contains_key("db"));
        assert!(!project.services.contains_key("stray"));
    }

    #[test]
    fn test_depends_on_conditions() {
        let project = convert_text(
            "services:\n  db:\n    image: pg\n  init:\n    image: mig\n  web:\n    image: nginx\n    depends_on:\n      db:\n        condition: service_healthy\n      init:\n        condition: service_completed_successfully\n",
        )
        .unwrap();
        let web = &project.services["web"];
        assert_eq!(web.depends_on_healthy, vec!["db"]);
        assert_eq!(web.depends_on_completed, vec!["init"]);
        assert!(web.depends_on.is_empty());
    }

    #[test]
    fn test_unknown_condition_fails() {
        let err = convert_text(
            "services:\n  db:\n    image: pg\n  web:\n    image: nginx\n    depends_on:\n      db:\n        condition: service_happy\n",
        )
        .unwrap_err();
        assert_eq!(err.category(), "invalid-argument");
    }

    #[test]
    fn test_healthcheck_string_becomes_shell() {
        let project = convert_text(
            "services:\n  db:\n    image: pg\n    healthcheck:\n      test: pg_isready\n      interval: 5s\n      retries: 3\n",
        )
        .unwrap();
        let check = project.services["db"].health_check.as_ref().unwrap();
        assert_eq!(check.test, vec!["/bin/sh", "-c", "pg_isready"]);
        assert_eq!(check.interval, Some(std::time::Duration::from_secs(5)));
        assert_eq!(check.retries, Some(3));
    }

    #[test]
    fn test_healthcheck_none_clears() {
        let project = convert_text(
            "services:\n  db:\n    image: pg\n    healthcheck:\n      test: [\"NONE\"]\n",
        )
        .unwrap();
        assert!(project.services["db"].health_check.is_none());
    }

    #[test]
    fn test_healthcheck_cmd_shell() {
        let project = convert_text(
            "services:\n  db:\n    image: pg\n    healthcheck:\n      test: [\"CMD-SHELL\", \"pg_isready -U app\"]\n",
        )
        .unwrap();
        let check = project.services["db"].health_check.as_ref().unwrap();
        assert_eq!(check.test, vec!["/bin/sh", "-c", "pg_isready -U app"]);
    }

    #[test]
    fn test_entrypoint_empty_string_clears() {
        let project = convert_text(
            "services:\n  web:\n    image: nginx\n    entrypoint: ''\n",
        )
        .unwrap();
        assert_eq!(
            project.services["web"].entrypoint,
            Some(vec![String::new()])
        );
    }

    #[test]
    fn test_default_network_synthesized() {
        let project = convert_text("services:\n  web:\n    image: nginx\n").unwrap();
        assert_eq!(project.services["web"].networks, vec!["default"]);
        let default = &project.networks["default"];
        assert_eq!(default.driver, "bridge");
        assert!(!default.external);
    }

    #[test]
    fn test_undeclared_network_fails() {
        let err = convert_text(
            "services:\n  web:\n    image: nginx\n    networks: [backend]\n",
        )
        .unwrap_err();
        assert_eq!(err.category(), "invalid-argument");
    }

    #[test]
    fn test_external_network_name() {
        let project = convert_text(
            "services:\n  web:\n    image: nginx\n    networks: [shared]\nnetworks:\n  shared:\n    external:\n      name: corp-net\n",
        )
        .unwrap();
        let shared = &project.networks["shared"];
        assert!(shared.external);
        assert_eq!(shared.external_name.as_deref(), Some("corp-net"));
    }

    #[test]
    fn test_dependency_filtered_out_by_profile_fails() {
        let err = convert_text(
            "services:\n  db:\n    image: pg\n    profiles: [extra]\n  web:\n    image: nginx\n    depends_on: [db]\n",
        )
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_deploy_limits_feed_resources() {
        let project = convert_text(
            "services:\n  web:\n    image: nginx\n    deploy:\n      resources:\n        limits:\n          cpus: \"1.5\"\n          memory: 512m\n",
        )
        .unwrap();
        let web = &project.services["web"];
        assert_eq!(web.cpus.as_deref(), Some("1.5"));
        assert_eq!(web.memory.as_deref(), Some("512m"));
    }

    #[test]
    fn test_anonymous_volume_normalized() {
        let project = convert_text(
            "services:\n  app:\n    image: x\n    volumes:\n      - /cache\n",
        )
        .unwrap();
        let mount = &project.services["app"].volumes[0];
        assert_eq!(mount.kind, MountKind::Volume);
        assert_eq!(mount.source, "");
        assert_eq!(mount.target, "/cache");
    }

    #[test]
    fn test_relative_bind_source_absolutized() {
        let project = convert_text(
            "services:\n  app:\n    image: x\n    volumes:\n      - ./data:/data\n",
        )
        .unwrap();
        let mount = &project.services["app"].volumes[0];
        assert_eq!(mount.kind, MountKind::Bind);
        assert!(Path::new(&mount.source).is_absolute(), "{}", mount.source);
        assert!(mount.source.ends_with("data"));
    }
}

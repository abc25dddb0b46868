//! Canonical project model produced by the compose pipeline.
//!
//! This module provides the post-conversion types the resolver and the
//! orchestrator operate on, plus the parsers for the stringly compose
//! syntaxes (port specs, volume short form, durations, memory sizes).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A complete project: services, networks, and volumes under a shared name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    /// Project name (lowercased directory name when not supplied)
    pub name: String,
    /// Services by name
    pub services: BTreeMap<String, Service>,
    /// Top-level networks by name
    pub networks: BTreeMap<String, Network>,
    /// Top-level volumes by name
    pub volumes: BTreeMap<String, Volume>,
}

impl Project {
    /// Compute the container ID for a service, honoring `container_name`
    pub fn container_id(&self, service: &Service) -> String {
        service
            .container_name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.name, service.name))
    }
}

/// A named container specification within a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    /// Service name (map key in the compose file)
    pub name: String,
    /// Image reference, if not built locally
    pub image: Option<String>,
    /// Build configuration, if the image is built from a context
    pub build: Option<BuildConfig>,
    /// Command override (replaces the image cmd)
    pub command: Option<Vec<String>>,
    /// Entrypoint override (replaces the image entrypoint; a single empty
    /// string clears it)
    pub entrypoint: Option<Vec<String>>,
    /// Working directory inside the container
    pub working_dir: Option<String>,
    /// Effective environment after env_file merging
    pub environment: BTreeMap<String, String>,
    /// Published ports
    pub ports: Vec<PortMapping>,
    /// Volume mounts
    pub volumes: Vec<VolumeMount>,
    /// Networks the container attaches to, in declared order
    pub networks: Vec<String>,
    /// Plain dependencies (list-form `depends_on`)
    pub depends_on: Vec<String>,
    /// Dependencies gated on a passing healthcheck
    pub depends_on_healthy: Vec<String>,
    /// Dependencies gated on the container running
    pub depends_on_started: Vec<String>,
    /// Dependencies gated on successful completion
    pub depends_on_completed: Vec<String>,
    /// Healthcheck configuration, if any
    pub health_check: Option<HealthCheck>,
    /// Deploy-section resource limits
    pub deploy: Option<DeployConfig>,
    /// Restart policy string (carried through to the runtime)
    pub restart: Option<String>,
    /// Explicit container name override
    pub container_name: Option<String>,
    /// Profiles this service activates under
    pub profiles: Vec<String>,
    /// User labels
    pub labels: BTreeMap<String, String>,
    /// CPU count request (raw compose string, e.g. `"2"` or `"0.5"`)
    pub cpus: Option<String>,
    /// Memory limit (raw compose string, e.g. `"256m"`, `"1g"`, `"max"`)
    pub memory: Option<String>,
    /// Allocate a terminal for the init process
    pub tty: bool,
    /// Keep stdin open
    pub stdin_open: bool,
}

impl Service {
    /// All dependency names across the four condition kinds, in declaration
    /// order with duplicates preserved
    pub fn all_dependencies(&self) -> impl Iterator<Item = &String> {
        self.depends_on
            .iter()
            .chain(self.depends_on_healthy.iter())
            .chain(self.depends_on_started.iter())
            .chain(self.depends_on_completed.iter())
    }

    /// Whether this service needs a local image build
    pub fn requires_build(&self) -> bool {
        self.build.is_some()
    }
}

/// Resource limits from the compose `deploy` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// CPU limit (compose string form)
    pub cpus: Option<String>,
    /// Memory limit (compose string form)
    pub memory: Option<String>,
}

/// A project-level network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network name (map key in the compose file)
    pub name: String,
    /// Driver; only `bridge` is supported
    pub driver: String,
    /// Whether this network is managed outside the project
    pub external: bool,
    /// Runtime name of an external network, when it differs from the key
    pub external_name: Option<String>,
}

/// A project-level volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name (map key in the compose file)
    pub name: String,
    /// Driver hint (informational)
    pub driver: String,
    /// Whether this volume is managed outside the project
    pub external: bool,
}

/// Transport protocol for a published port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (the default)
    Tcp,
    /// UDP
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(Error::invalid_argument(format!(
                "unsupported protocol '{other}' (expected tcp or udp)"
            ))),
        }
    }
}

/// A single host-to-container port publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host interface to bind; `None` means all interfaces
    pub host_ip: Option<String>,
    /// Port on the host
    pub host_port: u16,
    /// Port inside the container
    pub container_port: u16,
    /// Transport protocol
    pub protocol: Protocol,
}

impl PortMapping {
    /// Parse a compose port entry into one or more mappings.
    ///
    /// Accepts `HOST:CONTAINER`, `IP:HOST:CONTAINER`, and the range form
    /// `A-B:C-D`, each with an optional `/tcp` or `/udp` suffix. Range
    /// endpoints must produce equally sized host and container spans.
    pub fn parse(spec: &str) -> Result<Vec<Self>> {
        let (ports, protocol) = match spec.split_once('/') {
            Some((ports, proto)) => (ports, proto.parse::<Protocol>()?),
            None => (spec, Protocol::Tcp),
        };

        let parts: Vec<&str> = ports.split(':').collect();
        let (host_ip, host_part, container_part) = match parts.as_slice() {
            [host, container] => (None, *host, *container),
            [ip, host, container] => (Some((*ip).to_string()), *host, *container),
            _ => {
                return Err(Error::invalid_argument(format!(
                    "invalid port specification '{spec}'"
                )))
            }
        };

        let host_range = parse_port_range(host_part, spec)?;
        let container_range = parse_port_range(container_part, spec)?;
        if host_range.len() != container_range.len() {
            return Err(Error::invalid_argument(format!(
                "port range sizes do not match in '{spec}'"
            )));
        }

        Ok(host_range
            .into_iter()
            .zip(container_range)
            .map(|(host_port, container_port)| Self {
                host_ip: host_ip.clone(),
                host_port,
                container_port,
                protocol,
            })
            .collect())
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host_ip {
            Some(ip) => write!(
                f,
                "{ip}:{}->{}/{}",
                self.host_port, self.container_port, self.protocol
            ),
            None => write!(
                f,
                "{}->{}/{}",
                self.host_port, self.container_port, self.protocol
            ),
        }
    }
}

/// `A` or `A-B` into an inclusive list of ports
fn parse_port_range(part: &str, spec: &str) -> Result<Vec<u16>> {
    let parse_one = |s: &str| -> Result<u16> {
        let port: u32 = s
            .parse()
            .map_err(|_| Error::invalid_argument(format!("invalid port '{s}' in '{spec}'")))?;
        if port == 0 || port > 65535 {
            return Err(Error::invalid_argument(format!(
                "port {port} out of range in '{spec}'"
            )));
        }
        Ok(port as u16)
    };

    match part.split_once('-') {
        Some((start, end)) => {
            let start = parse_one(start)?;
            let end = parse_one(end)?;
            if end < start {
                return Err(Error::invalid_argument(format!(
                    "descending port range in '{spec}'"
                )));
            }
            Ok((start..=end).collect())
        }
        None => Ok(vec![parse_one(part)?]),
    }
}

/// How a mount is realized by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Host directory surfaced into the container
    Bind,
    /// Managed (named or anonymous) volume
    Volume,
    /// In-memory filesystem
    Tmpfs,
}

impl Default for MountKind {
    fn default() -> Self {
        Self::Volume
    }
}

/// A single mount into a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Mount kind
    #[serde(rename = "type")]
    pub kind: MountKind,
    /// Host path (bind) or volume name; empty for anonymous volumes
    pub source: String,
    /// Path inside the container
    pub target: String,
    /// Mount read-only
    pub read_only: bool,
}

/// Mount options accepted in the short volume syntax
const SHORT_VOLUME_OPTIONS: &[&str] = &["ro", "rw", "z", "Z", "cached", "delegated"];

impl VolumeMount {
    /// Parse the short volume syntax.
    ///
    /// `CONTAINER_PATH` alone yields an anonymous volume; `SOURCE:TARGET`
    /// and `SOURCE:TARGET:OPT` distinguish binds from named volumes by
    /// whether the source looks like a path (`/`, `./`, `../`, `~`).
    /// Path expansion against home and cwd is the converter's job.
    pub fn parse_short(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [target] if target.starts_with('/') => Ok(Self {
                kind: MountKind::Volume,
                source: String::new(),
                target: (*target).to_string(),
                read_only: false,
            }),
            [source, target] | [source, target, _] => {
                let read_only = match parts.get(2) {
                    Some(opt) => {
                        if !SHORT_VOLUME_OPTIONS.contains(opt) {
                            return Err(Error::invalid_argument(format!(
                                "unknown volume option '{opt}' in '{spec}'"
                            )));
                        }
                        *opt == "ro"
                    }
                    None => false,
                };
                if target.is_empty() || !target.starts_with('/') {
                    return Err(Error::invalid_argument(format!(
                        "container path must be absolute in volume '{spec}'"
                    )));
                }
                let is_path = source.starts_with('/')
                    || source.starts_with("./")
                    || source.starts_with("../")
                    || source.starts_with('~');
                Ok(Self {
                    kind: if is_path {
                        MountKind::Bind
                    } else {
                        MountKind::Volume
                    },
                    source: (*source).to_string(),
                    target: (*target).to_string(),
                    read_only,
                })
            }
            _ => Err(Error::invalid_argument(format!(
                "invalid volume specification '{spec}'"
            ))),
        }
    }
}

/// Healthcheck settings for a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Command executed inside the container; exit 0 means healthy
    pub test: Vec<String>,
    /// Delay between attempts
    pub interval: Option<Duration>,
    /// Per-attempt timeout
    pub timeout: Option<Duration>,
    /// Attempts before the check is considered failed
    pub retries: Option<u32>,
    /// Grace period before the first attempt
    pub start_period: Option<Duration>,
}

/// Build settings for a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build context directory
    pub context: Option<String>,
    /// Dockerfile path, relative to the context unless absolute
    pub dockerfile: Option<String>,
    /// Build arguments
    pub args: BTreeMap<String, String>,
    /// Target build stage
    pub target: Option<String>,
}

/// Validate an environment variable name (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a compose duration: `<number><s|m|h>`, bare numbers are seconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = value
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid duration '{s}'")))?;
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        _ => {
            return Err(Error::invalid_argument(format!(
                "invalid duration unit in '{s}' (expected s, m, or h)"
            )))
        }
    };
    Ok(Duration::from_secs(seconds))
}

/// Parse a memory size string into bytes.
///
/// Accepts `123`, `512k`, `256m`, `1g` (case-insensitive, optional `b`
/// suffix). The string `"max"` means "leave the runtime default" and
/// yields `None`.
pub fn parse_memory(s: &str) -> Result<Option<u64>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("max") {
        return Ok(None);
    }
    let lower = s.to_ascii_lowercase();
    let digits_end = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (value, unit) = lower.split_at(digits_end);
    let value: u64 = value
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid memory size '{s}'")))?;
    let multiplier: u64 = match unit.trim_end_matches('b') {
        "" => 1,
        "k" => 1024,
        "m" => 1024 * 1024,
        "g" => 1024 * 1024 * 1024,
        _ => {
            return Err(Error::invalid_argument(format!(
                "invalid memory unit in '{s}'"
            )))
        }
    };
    Ok(Some(value * multiplier))
}

/// Parse a compose cpus string into a whole CPU count (fractions round up)
pub fn parse_cpus(s: &str) -> Result<u32> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid cpus value '{s}'")))?;
    if !(value > 0.0) || value > 1024.0 {
        return Err(Error::invalid_argument(format!(
            "cpus value '{s}' out of range"
        )));
    }
    Ok(value.ceil() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_port() {
        let mappings = PortMapping::parse("8080:80").unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].host_port, 8080);
        assert_eq!(mappings[0].container_port, 80);
        assert_eq!(mappings[0].protocol, Protocol::Tcp);
        assert!(mappings[0].host_ip.is_none());
    }

    #[test]
    fn test_parse_port_with_ip_and_proto() {
        let mappings = PortMapping::parse("127.0.0.1:5353:53/udp").unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(mappings[0].host_port, 5353);
        assert_eq!(mappings[0].container_port, 53);
        assert_eq!(mappings[0].protocol, Protocol::Udp);
    }

    #[test]
    fn test_parse_port_range() {
        let mappings = PortMapping::parse("4510-4512:4510-4512/udp").unwrap();
        assert_eq!(mappings.len(), 3);
        for (i, mapping) in mappings.iter().enumerate() {
            assert_eq!(mapping.host_port, 4510 + i as u16);
            assert_eq!(mapping.container_port, 4510 + i as u16);
            assert_eq!(mapping.protocol, Protocol::Udp);
        }
    }

    #[test]
    fn test_parse_port_range_mismatch() {
        let err = PortMapping::parse("4510-4512:4510-4511").unwrap_err();
        assert_eq!(err.category(), "invalid-argument");
    }

    #[test]
    fn test_parse_port_rejects_zero_and_garbage() {
        assert!(PortMapping::parse("0:80").is_err());
        assert!(PortMapping::parse("banana:80").is_err());
        assert!(PortMapping::parse("80").is_err());
        assert!(PortMapping::parse("1:2:3:4").is_err());
        assert!(PortMapping::parse("8080:80/sctp").is_err());
    }

    #[test]
    fn test_parse_anonymous_volume() {
        let mount = VolumeMount::parse_short("/cache").unwrap();
        assert_eq!(mount.kind, MountKind::Volume);
        assert_eq!(mount.source, "");
        assert_eq!(mount.target, "/cache");
        assert!(!mount.read_only);
    }

    #[test]
    fn test_parse_bind_volume() {
        let mount = VolumeMount::parse_short("./data:/var/lib/data:ro").unwrap();
        assert_eq!(mount.kind, MountKind::Bind);
        assert_eq!(mount.source, "./data");
        assert_eq!(mount.target, "/var/lib/data");
        assert!(mount.read_only);
    }

    #[test]
    fn test_parse_named_volume() {
        let mount = VolumeMount::parse_short("pgdata:/var/lib/postgresql/data").unwrap();
        assert_eq!(mount.kind, MountKind::Volume);
        assert_eq!(mount.source, "pgdata");
        assert!(!mount.read_only);
    }

    #[test]
    fn test_parse_volume_rejects_bad_option() {
        let err = VolumeMount::parse_short("data:/data:rwx").unwrap_err();
        assert_eq!(err.category(), "invalid-argument");
    }

    #[test]
    fn test_env_name_validation() {
        assert!(is_valid_env_name("PATH"));
        assert!(is_valid_env_name("_private"));
        assert!(is_valid_env_name("DB_PORT_2"));
        assert!(!is_valid_env_name("2FAST"));
        assert!(!is_valid_env_name("WITH-DASH"));
        assert!(!is_valid_env_name(""));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert!(parse_duration("10ms").is_err());
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(parse_memory("1024").unwrap(), Some(1024));
        assert_eq!(parse_memory("512k").unwrap(), Some(512 * 1024));
        assert_eq!(parse_memory("256m").unwrap(), Some(256 * 1024 * 1024));
        assert_eq!(parse_memory("1g").unwrap(), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory("1gb").unwrap(), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory("max").unwrap(), None);
        assert!(parse_memory("lots").is_err());
    }

    #[test]
    fn test_parse_cpus() {
        assert_eq!(parse_cpus("2").unwrap(), 2);
        assert_eq!(parse_cpus("0.5").unwrap(), 1);
        assert_eq!(parse_cpus("1.5").unwrap(), 2);
        assert!(parse_cpus("0").is_err());
        assert!(parse_cpus("many").is_err());
    }

    #[test]
    fn test_container_id_default_and_override() {
        let mut project = Project {
            name: "proj".to_string(),
            ..Project::default()
        };
        let mut service = Service {
            name: "web".to_string(),
            ..Service::default()
        };
        project
            .services
            .insert("web".to_string(), service.clone());
        assert_eq!(project.container_id(&service), "proj_web");

        service.container_name = Some("frontdoor".to_string());
        assert_eq!(project.container_id(&service), "frontdoor");
    }
}

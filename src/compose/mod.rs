//! Compose file loading: parse, interpolate, merge, validate, convert.
//!
//! The entry point is [`load_project`], which takes a [`ComposeLoadOptions`]
//! and runs the full pipeline over one or more YAML compose files,
//! producing a canonical [`Project`](crate::project::Project). The AST
//! types in this module mirror the YAML shape, including the fields that
//! accept two shapes (string-or-list, list-or-map).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::project::Project;

pub mod convert;
pub mod env_file;
pub mod interpolate;
pub mod merge;
pub mod parser;

/// File names probed when no compose file path is supplied
const DEFAULT_FILE_NAMES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Options controlling a compose load
#[derive(Debug, Clone, Default)]
pub struct ComposeLoadOptions {
    /// Compose file paths, in override order (later wins); empty means
    /// discover a default file in the current directory
    pub paths: Vec<PathBuf>,
    /// Project name override; defaults to the lowercased directory name
    pub project_name: Option<String>,
    /// Active profiles
    pub profiles: Vec<String>,
    /// Explicit service selection (empty means all)
    pub services: Vec<String>,
    /// `KEY=VAL` overrides that win over shell environment and `.env`
    pub env_overrides: BTreeMap<String, String>,
    /// Permit YAML anchors and merge keys
    pub allow_anchors: bool,
}

impl ComposeLoadOptions {
    /// Create options for a single compose file
    pub fn for_file(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            ..Self::default()
        }
    }

    /// Look up a variable with override-then-process-env precedence
    pub(crate) fn env_lookup(&self, name: &str) -> Option<String> {
        self.env_overrides
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }
}

/// Load, merge, validate, and convert compose files into a [`Project`].
///
/// Each file gets its own `.env` load and interpolation pass; only the
/// merged document is validated and converted.
pub fn load_project(options: &ComposeLoadOptions) -> Result<Project> {
    let paths = resolve_paths(options)?;

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(load_file(path, options)?);
    }

    let merged = merge::merge_files(files);
    parser::validate(&merged)?;

    let name = project_name(options, &paths)?;
    let base_dir = paths
        .first()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    convert::convert(merged, &name, &base_dir, options)
}

/// Parse a single compose file (with its sibling `.env`) into the AST
pub fn load_file(path: &Path, options: &ComposeLoadOptions) -> Result<ComposeFile> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::not_found(format!("compose file {}: {e}", path.display())))?;

    if let Some(dir) = path.parent() {
        env_file::load_dot_env(dir);
    }

    let interpolated = interpolate::interpolate(&text, &|name| options.env_lookup(name))
        .map_err(|e| Error::invalid_argument(format!("{}: {e}", path.display())))?;

    parser::parse_compose_text(&interpolated, options.allow_anchors)
        .map_err(|e| match e {
            Error::Yaml { message, source } => Error::Yaml {
                message: format!("{}: {message}", path.display()),
                source,
            },
            Error::InvalidArgument { message } => {
                Error::invalid_argument(format!("{}: {message}", path.display()))
            }
            other => other,
        })
}

fn resolve_paths(options: &ComposeLoadOptions) -> Result<Vec<PathBuf>> {
    if !options.paths.is_empty() {
        return Ok(options.paths.clone());
    }
    for name in DEFAULT_FILE_NAMES {
        let candidate = PathBuf::from(name);
        if candidate.is_file() {
            return Ok(vec![candidate]);
        }
    }
    Err(Error::not_found(
        "no compose file found (looked for compose.yaml, compose.yml, \
         docker-compose.yaml, docker-compose.yml)",
    ))
}

fn project_name(options: &ComposeLoadOptions, paths: &[PathBuf]) -> Result<String> {
    if let Some(name) = &options.project_name {
        return Ok(name.clone());
    }
    let dir = paths
        .first()
        .and_then(|p| p.canonicalize().ok())
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| Error::invalid_argument("cannot determine project directory"))?;
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::invalid_argument("cannot derive project name from directory"))?;
    Ok(name)
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

/// A compose document as decoded from YAML, before merging and conversion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Declared compose version (advisory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Service definitions
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,
    /// Top-level networks; a bare key decodes as `None`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, Option<TopLevelNetwork>>,
    /// Top-level volumes; a bare key decodes as `None`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Option<TopLevelVolume>>,
    /// Unknown top-level keys, preserved silently
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A service definition as written in YAML.
///
/// Unknown keys fail decoding; the permissive two-shape fields use the
/// variant types below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeService {
    /// Image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Build context (short string form or full block)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
    /// Command override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<StringOrList>,
    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<StringOrList>,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Environment (list or map form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    /// Environment files applied before `environment`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<StringOrList>,
    /// Published ports (string entries)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
    /// Volume mounts (short string or long form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<VolumeEntry>>,
    /// Networks (list or map form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<NetworkAttachments>,
    /// Dependencies (list or conditioned map form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,
    /// Healthcheck block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheckSpec>,
    /// Deploy block (resource limits only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeploySpec>,
    /// Restart policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    /// Container name override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Profiles gating this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<Vec<String>>,
    /// Labels (list or map form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    /// CPU request (number or string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<NumberOrString>,
    /// Memory limit (accepts the legacy `mem_limit` spelling)
    #[serde(
        default,
        alias = "mem_limit",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory: Option<NumberOrString>,
    /// Allocate a terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<bool>,
    /// Keep stdin open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin_open: Option<bool>,
    /// Service inheritance within the same file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<ExtendsSpec>,
}

/// Top-level network block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopLevelNetwork {
    /// Driver (only `bridge` supported downstream)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// External marker (bool or `{name}` form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalSpec>,
    /// Explicit runtime name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Top-level volume block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopLevelVolume {
    /// Driver hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// External marker (bool or `{name}` form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalSpec>,
    /// Explicit runtime name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `extends` pointer; only same-file inheritance is supported, so the
/// `file:` key is deliberately absent and fails decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtendsSpec {
    /// Base service name
    pub service: String,
}

/// A value that may be written as one string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    /// Single string form
    String(String),
    /// List form
    List(Vec<String>),
}

impl StringOrList {
    /// Flatten into a list; the string form becomes a one-element list
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::String(s) => vec![s.clone()],
            Self::List(items) => items.clone(),
        }
    }

    /// Split the string form on whitespace, honoring single and double
    /// quotes, for command-like fields; the list form is used verbatim
    pub fn to_command(&self) -> Vec<String> {
        match self {
            Self::String(s) => split_command(s),
            Self::List(items) => items.clone(),
        }
    }
}

/// Whitespace-split with quote awareness (no escapes inside quotes)
fn split_command(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut pending = false;
    for c in s.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                pending = true;
            }
            None if c.is_whitespace() => {
                if pending || !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            None => current.push(c),
        }
    }
    if pending || !current.is_empty() {
        out.push(current);
    }
    out
}

/// Environment written as `KEY=VAL` entries or a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Environment {
    /// `- KEY=VAL` list form; a bare `KEY` inherits the process value
    List(Vec<String>),
    /// Map form; values may be any YAML scalar
    Map(BTreeMap<String, Option<serde_yaml::Value>>),
}

impl Environment {
    /// Canonicalize into a string map
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Self::List(entries) => entries
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (
                        entry.clone(),
                        std::env::var(entry).unwrap_or_default(),
                    ),
                })
                .collect(),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map(scalar_to_string).unwrap_or_default()))
                .collect(),
        }
    }
}

/// Labels written as `key=value` entries or a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Labels {
    /// `- key=value` list form
    List(Vec<String>),
    /// Map form
    Map(BTreeMap<String, Option<serde_yaml::Value>>),
}

impl Labels {
    /// Canonicalize into a string map; list entries without `=` get an
    /// empty value
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Self::List(entries) => entries
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (entry.clone(), String::new()),
                })
                .collect(),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map(scalar_to_string).unwrap_or_default()))
                .collect(),
        }
    }
}

/// Dependency condition names accepted in the map form of `depends_on`
pub const CONDITION_STARTED: &str = "service_started";
/// Healthy-gated dependency condition
pub const CONDITION_HEALTHY: &str = "service_healthy";
/// Completed-successfully dependency condition
pub const CONDITION_COMPLETED: &str = "service_completed_successfully";

/// `depends_on` in list or conditioned-map form; a bare map key means
/// `service_started`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    /// Plain list of service names
    List(Vec<String>),
    /// Map of service name to condition
    Map(BTreeMap<String, Option<DependsOnEntry>>),
}

impl DependsOn {
    /// All referenced service names, regardless of condition
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::List(names) => names.clone(),
            Self::Map(map) => map.keys().cloned().collect(),
        }
    }
}

/// A single map-form `depends_on` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOnEntry {
    /// Condition name; absent means `service_started`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Service `networks` in list or map form; the map form preserves
/// declaration order via [`serde_yaml::Mapping`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkAttachments {
    /// Plain list of network names
    List(Vec<String>),
    /// Map form (per-network settings are accepted and ignored)
    Map(serde_yaml::Mapping),
}

impl NetworkAttachments {
    /// Network names in declaration order
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::List(names) => names.clone(),
            Self::Map(map) => map
                .keys()
                .filter_map(|k| k.as_str().map(ToString::to_string))
                .collect(),
        }
    }
}

/// `external:` written as a bool or `{name: ...}` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalSpec {
    /// Plain boolean form
    Bool(bool),
    /// Named form, implying external
    WithName {
        /// Runtime name of the external resource
        name: Option<String>,
    },
}

impl ExternalSpec {
    /// Whether the resource is external
    pub fn is_external(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::WithName { .. } => true,
        }
    }

    /// External name override, if given
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Bool(_) => None,
            Self::WithName { name } => name.as_deref(),
        }
    }
}

/// A service volume entry: short string syntax or the long block form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeEntry {
    /// `source:target[:opt]` short syntax
    Short(String),
    /// Long block form
    Long(LongVolume),
}

/// Long-form volume block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongVolume {
    /// Mount type: `bind`, `volume`, or `tmpfs` (defaults to `volume`)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Host path or volume name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Path inside the container
    pub target: String,
    /// Mount read-only
    #[serde(default)]
    pub read_only: bool,
}

/// `build:` short string form or full block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildSpec {
    /// Context-only short form
    Short(String),
    /// Full block form
    Full {
        /// Build context directory
        #[serde(default)]
        context: Option<String>,
        /// Dockerfile path
        #[serde(default)]
        dockerfile: Option<String>,
        /// Build args (list or map form)
        #[serde(default)]
        args: Option<Labels>,
        /// Target stage
        #[serde(default)]
        target: Option<String>,
    },
}

/// Healthcheck block as written in YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// Test command: string, `["CMD", ...]`, `["CMD-SHELL", s]`, or
    /// `["NONE"]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<StringOrList>,
    /// Interval between attempts (`10s` style)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Per-attempt timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Attempt budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Grace period before the first attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
    /// Disable the healthcheck entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
}

/// Deploy block (only resource limits are consumed)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploySpec {
    /// Resource section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<DeployResources>,
}

/// `deploy.resources`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployResources {
    /// Hard limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<DeployLimits>,
}

/// `deploy.resources.limits`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployLimits {
    /// CPU limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<NumberOrString>,
    /// Memory limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<NumberOrString>,
}

/// A YAML scalar that may arrive as a number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    /// Numeric form
    Number(f64),
    /// String form
    String(String),
}

impl NumberOrString {
    /// Render as the compose string form
    pub fn as_string(&self) -> String {
        match self {
            Self::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::String(s) => s.clone(),
        }
    }
}

/// Render a YAML scalar as its string form; non-scalars become empty
fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_list_form() {
        let env: Environment =
            serde_yaml::from_str("- FOO=bar\n- BAZ=qux=quux").unwrap();
        let map = env.to_map();
        assert_eq!(map.get("FOO").unwrap(), "bar");
        assert_eq!(map.get("BAZ").unwrap(), "qux=quux");
    }

    #[test]
    fn test_environment_map_form_scalars() {
        let env: Environment =
            serde_yaml::from_str("FOO: 1\nFLAG: true\nNAME: db\nEMPTY:").unwrap();
        let map = env.to_map();
        assert_eq!(map.get("FOO").unwrap(), "1");
        assert_eq!(map.get("FLAG").unwrap(), "true");
        assert_eq!(map.get("NAME").unwrap(), "db");
        assert_eq!(map.get("EMPTY").unwrap(), "");
    }

    #[test]
    fn test_depends_on_both_forms() {
        let list: DependsOn = serde_yaml::from_str("- db\n- cache").unwrap();
        assert_eq!(list.names(), vec!["db", "cache"]);

        let map: DependsOn =
            serde_yaml::from_str("db:\n  condition: service_healthy\ncache: {}").unwrap();
        let mut names = map.names();
        names.sort();
        assert_eq!(names, vec!["cache", "db"]);
    }

    #[test]
    fn test_network_attachments_preserve_order() {
        let map: NetworkAttachments =
            serde_yaml::from_str("backend:\nfrontend:\nadmin:").unwrap();
        assert_eq!(map.names(), vec!["backend", "frontend", "admin"]);
    }

    #[test]
    fn test_external_spec_forms() {
        let plain: ExternalSpec = serde_yaml::from_str("true").unwrap();
        assert!(plain.is_external());
        assert!(plain.name().is_none());

        let named: ExternalSpec = serde_yaml::from_str("name: shared-net").unwrap();
        assert!(named.is_external());
        assert_eq!(named.name(), Some("shared-net"));
    }

    #[test]
    fn test_build_spec_forms() {
        let short: BuildSpec = serde_yaml::from_str("./api").unwrap();
        assert_eq!(short, BuildSpec::Short("./api".to_string()));

        let full: BuildSpec =
            serde_yaml::from_str("context: ./api\ndockerfile: Dockerfile.dev").unwrap();
        match full {
            BuildSpec::Full {
                context, dockerfile, ..
            } => {
                assert_eq!(context.as_deref(), Some("./api"));
                assert_eq!(dockerfile.as_deref(), Some("Dockerfile.dev"));
            }
            BuildSpec::Short(_) => panic!("expected full form"),
        }
    }

    #[test]
    fn test_unknown_service_key_fails() {
        let result: std::result::Result<ComposeService, _> =
            serde_yaml::from_str("image: nginx\nreplicas_typo: 3");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_top_level_key_preserved() {
        let file: ComposeFile =
            serde_yaml::from_str("services:\n  web:\n    image: nginx\nx-custom:\n  a: 1")
                .unwrap();
        assert!(file.extra.contains_key("x-custom"));
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("echo hello"), vec!["echo", "hello"]);
        assert_eq!(
            split_command("sh -c 'sleep 1 && echo done'"),
            vec!["sh", "-c", "sleep 1 && echo done"]
        );
        assert_eq!(split_command("  spaced   out  "), vec!["spaced", "out"]);
        assert_eq!(split_command("say \"\""), vec!["say", ""]);
    }

    #[test]
    fn test_extends_rejects_cross_file() {
        let result: std::result::Result<ExtendsSpec, _> =
            serde_yaml::from_str("service: base\nfile: other.yml");
        assert!(result.is_err());
    }

    #[test]
    fn test_number_or_string() {
        let n: NumberOrString = serde_yaml::from_str("2").unwrap();
        assert_eq!(n.as_string(), "2");
        let n: NumberOrString = serde_yaml::from_str("0.5").unwrap();
        assert_eq!(n.as_string(), "0.5");
        let n: NumberOrString = serde_yaml::from_str("\"256m\"").unwrap();
        assert_eq!(n.as_string(), "256m");
    }
}

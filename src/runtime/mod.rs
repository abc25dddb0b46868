//! Runtime adapter interfaces the orchestrator is written against.
//!
//! Concrete implementations live in a separate runtime library; the
//! orchestrator only sees these traits. All of them are object-safe so
//! a [`Runtime`] can aggregate trait objects, and the in-memory mock in
//! the integration tests implements the same surface.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::project::Protocol;

/// Container labels that bind runtime state to a project
pub mod labels {
    /// Project a container or volume belongs to
    pub const PROJECT: &str = "com.apple.compose.project";
    /// Service a container or volume belongs to
    pub const SERVICE: &str = "com.apple.compose.service";
    /// Container name recorded at creation
    pub const CONTAINER: &str = "com.apple.compose.container";
    /// Configuration fingerprint used for recreate decisions
    pub const CONFIG_HASH: &str = "com.apple.container.compose.config-hash";
    /// Mount target recorded on managed volumes
    pub const TARGET: &str = "com.apple.compose.target";
    /// Whether a managed volume was generated for a bare mount path
    pub const ANONYMOUS: &str = "com.apple.compose.anonymous";
}

/// Lifecycle state reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Created but not started
    Created,
    /// Init process is running
    Running,
    /// Stopped or exited
    Stopped,
}

impl ContainerStatus {
    /// Whether the container is running
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A container as reported by the runtime listing
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Stable container ID
    pub id: String,
    /// Lifecycle state
    pub status: ContainerStatus,
    /// The configuration the container was created with
    pub configuration: ContainerConfiguration,
}

impl ContainerSummary {
    /// Label lookup helper
    pub fn label(&self, key: &str) -> Option<&str> {
        self.configuration.labels.get(key).map(String::as_str)
    }
}

/// Everything the runtime needs to create a container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfiguration {
    /// Container ID (also used as hostname on the default network)
    pub id: String,
    /// Image reference
    pub image: String,
    /// Final exec line: entrypoint plus command
    pub exec: Vec<String>,
    /// Working directory for the init process
    pub working_dir: Option<String>,
    /// Environment variables
    pub environment: BTreeMap<String, String>,
    /// Labels, including the compose bookkeeping labels
    pub labels: BTreeMap<String, String>,
    /// Ports published on the host
    pub published_ports: Vec<PublishedPort>,
    /// Filesystem mounts
    pub mounts: Vec<MountSpec>,
    /// Network attachments in declared order
    pub networks: Vec<NetworkAttachment>,
    /// Whole CPUs allocated
    pub cpus: u32,
    /// Memory limit in bytes
    pub memory_bytes: u64,
    /// Attach a terminal to the init process
    pub tty: bool,
}

/// A port published on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPort {
    /// Host interface address
    pub host_address: String,
    /// Host port
    pub host_port: u16,
    /// Container port
    pub container_port: u16,
    /// Transport protocol
    pub protocol: Protocol,
}

/// A mount as handed to the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MountSpec {
    /// Host directory shared into the guest
    Virtiofs {
        /// Absolute host path
        source: String,
        /// Path inside the container
        destination: String,
        /// Mount read-only
        read_only: bool,
    },
    /// Managed volume backed by a runtime-resolved host source
    Block {
        /// Host source reported by the volume inspect
        source: String,
        /// Path inside the container
        destination: String,
        /// Filesystem format
        format: String,
        /// Mount read-only
        read_only: bool,
    },
    /// In-memory filesystem
    Tmpfs {
        /// Path inside the container
        destination: String,
    },
}

/// Attachment of a container to one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Runtime network ID
    pub network: String,
    /// Hostname on that network
    pub hostname: Option<String>,
}

/// Network modes supported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// Address translation behind the host
    Nat,
}

/// A network as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRecord {
    /// Runtime network ID
    pub id: String,
}

/// A managed volume as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRecord {
    /// Volume name
    pub name: String,
    /// Resolved host source backing the volume
    pub source: String,
    /// Filesystem format of the backing store
    pub format: String,
    /// Labels set at creation
    pub labels: BTreeMap<String, String>,
}

/// An image with the configuration relevant to container creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Image reference
    pub reference: String,
    /// Entry configuration baked into the image
    pub config: ImageConfig,
}

/// Image-level process defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageConfig {
    /// Image entrypoint
    pub entrypoint: Vec<String>,
    /// Image cmd
    pub cmd: Vec<String>,
    /// Image working directory
    pub working_dir: Option<String>,
}

/// Configuration for a process spawned inside a running container
#[derive(Debug, Clone, Default)]
pub struct ProcessConfig {
    /// Argv, executable first
    pub command: Vec<String>,
    /// Extra environment variables
    pub environment: BTreeMap<String, String>,
    /// Working directory
    pub working_dir: Option<String>,
    /// Run as this user
    pub user: Option<String>,
    /// Attach a terminal
    pub terminal: bool,
}

/// How a spawned process's stdio is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Attach to the caller's stdio
    Inherit,
    /// Discard all streams
    Discard,
}

/// Which log stream a source carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output
    Stdout,
    /// Standard error (also carries boot logs when requested)
    Stderr,
}

/// One readable log stream of a container
pub struct LogSource {
    /// Stream label
    pub stream: LogStream,
    /// Byte stream; EOF means the source closed
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSource")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Handle to a process spawned via [`ContainerClient::create_process`]
#[async_trait]
pub trait ProcessHandle: Send {
    /// Start the process
    async fn start(&mut self) -> Result<()>;
    /// Wait for termination and return the exit code. Must be
    /// cancellation-safe: callers may drop the wait future and call
    /// `wait` again.
    async fn wait(&mut self) -> Result<i32>;
    /// Deliver a signal
    async fn kill(&mut self, signal: i32) -> Result<()>;
}

/// Container operations
#[async_trait]
pub trait ContainerClient: Send + Sync {
    /// Enumerate all containers
    async fn list(&self) -> Result<Vec<ContainerSummary>>;
    /// Fetch one container; not-found if absent
    async fn get(&self, id: &str) -> Result<ContainerSummary>;
    /// Create a container; already-exists when the ID is taken
    async fn create(&self, config: &ContainerConfiguration) -> Result<()>;
    /// Prepare the sandbox; idempotent per container
    async fn bootstrap(&self, id: &str) -> Result<()>;
    /// Start the init process
    async fn start(&self, id: &str) -> Result<()>;
    /// Graceful stop with a deadline before the runtime escalates
    async fn stop(&self, id: &str, timeout: Duration) -> Result<()>;
    /// Deliver a signal to the init process
    async fn kill(&self, id: &str, signal: i32) -> Result<()>;
    /// Delete the container
    async fn delete(&self, id: &str, force: bool) -> Result<()>;
    /// Spawn a process inside a running container
    async fn create_process(
        &self,
        id: &str,
        config: &ProcessConfig,
        stdio: StdioMode,
    ) -> Result<Box<dyn ProcessHandle>>;
    /// Open the container's log streams, stdout first
    async fn logs(&self, id: &str, follow: bool, include_boot: bool) -> Result<Vec<LogSource>>;
}

/// Image operations
#[async_trait]
pub trait ImageClient: Send + Sync {
    /// Resolve a local image by reference; not-found if absent
    async fn get(&self, reference: &str) -> Result<Image>;
    /// Pull an image by reference
    async fn fetch(&self, reference: &str) -> Result<Image>;
}

/// Network operations
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Create a network by runtime ID
    async fn create(&self, id: &str, mode: NetworkMode) -> Result<NetworkRecord>;
    /// Fetch a network by runtime ID; not-found if absent
    async fn get(&self, id: &str) -> Result<NetworkRecord>;
    /// Delete a network by runtime ID
    async fn delete(&self, id: &str) -> Result<()>;
    /// Runtime-default network, if the runtime has one
    async fn default_network(&self) -> Result<Option<String>>;
}

/// Volume operations
#[async_trait]
pub trait VolumeClient: Send + Sync {
    /// Create a volume with labels
    async fn create(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<VolumeRecord>;
    /// Enumerate all volumes
    async fn list(&self) -> Result<Vec<VolumeRecord>>;
    /// Fetch one volume; not-found if absent
    async fn inspect(&self, name: &str) -> Result<VolumeRecord>;
    /// Delete a volume
    async fn delete(&self, name: &str) -> Result<()>;
}

/// One build invocation
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Tag to apply to the built image
    pub tag: String,
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile path
    pub dockerfile: PathBuf,
    /// Build arguments
    pub args: BTreeMap<String, String>,
    /// Target stage
    pub target: Option<String>,
}

/// Image build adapter; the default implementation spawns an external
/// builder executable
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build and tag an image
    async fn build(&self, request: &BuildRequest) -> Result<()>;
}

/// Aggregated runtime handles the orchestrator is constructed with
#[derive(Clone)]
pub struct Runtime {
    /// Container operations
    pub containers: Arc<dyn ContainerClient>,
    /// Image operations
    pub images: Arc<dyn ImageClient>,
    /// Network operations
    pub networks: Arc<dyn NetworkClient>,
    /// Volume operations
    pub volumes: Arc<dyn VolumeClient>,
    /// Image builds
    pub builder: Arc<dyn ImageBuilder>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

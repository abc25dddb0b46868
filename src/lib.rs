//! # container-compose
//!
//! The core of a Compose-style multi-container orchestrator: it loads
//! declarative YAML project descriptions, normalizes them into a
//! canonical project model, and drives a container runtime to
//! materialize the described services with correct ordering, lifecycle,
//! and cleanup semantics.
//!
//! ## Architecture
//!
//! The crate is organized as a pipeline feeding an orchestrator:
//!
//! - [`compose`] - parsing, interpolation, multi-file merging,
//!   inheritance resolution, and validation producing a [`Project`]
//! - [`resolver`] - topological service ordering with parallel groups
//!   and cycle detection
//! - [`orchestrator`] - reconciles a project against the runtime:
//!   builds images, creates or reuses containers by configuration
//!   fingerprint, gates starts on dependency conditions, streams logs,
//!   executes commands, and tears projects down
//! - [`runtime`] - the adapter traits the orchestrator is written
//!   against; concrete implementations live in a runtime library
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use container_compose::{ComposeLoadOptions, Orchestrator, UpOptions};
//! # async fn example(runtime: container_compose::runtime::Runtime) -> container_compose::Result<()> {
//! let options = ComposeLoadOptions::for_file("docker-compose.yml");
//! let project = container_compose::load_project(&options)?;
//!
//! let orchestrator = Orchestrator::new(runtime);
//! orchestrator
//!     .up(
//!         &project,
//!         &UpOptions {
//!             detach: true,
//!             wait: true,
//!             ..UpOptions::default()
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Re-export the most commonly used types
pub use compose::{load_project, ComposeFile, ComposeLoadOptions};
pub use error::{Error, Result};
pub use orchestrator::{
    DownOptions, DownReport, ExecOptions, ExternalBuilder, LogEntry, LogsOptions, Orchestrator,
    PsEntry, PullPolicy, UpOptions,
};
pub use project::{
    BuildConfig, HealthCheck, MountKind, PortMapping, Project, Protocol, Service, VolumeMount,
};
pub use resolver::{filter_with_dependencies, resolve, StartPlan};

// Core modules
pub mod compose;
pub mod error;
pub mod orchestrator;
pub mod project;
pub mod resolver;
pub mod runtime;

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
    }
}

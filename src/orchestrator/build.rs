//! Image building: deterministic tags, external builder discovery and
//! invocation, and the bounded-concurrency build phase.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::orchestrator::state::BuildCacheKey;
use crate::orchestrator::Orchestrator;
use crate::project::{BuildConfig, Service};
use crate::runtime::{BuildRequest, ImageBuilder};

/// Maximum builds in flight at once
const MAX_CONCURRENT_BUILDS: usize = 3;
/// Default builder executable name
const DEFAULT_BUILDER: &str = "container";
/// Well-known install locations probed after `which` and the sibling
/// lookup fail
const STANDARD_LOCATIONS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin"];

/// Deterministic tag for a built service image:
/// `<project>_<service>:<12 hex of SHA-256(project, service, context,
/// dockerfile, sorted args)>`. A service-declared `image` wins.
pub fn build_tag(project: &str, service: &Service, build: &BuildConfig) -> String {
    if let Some(image) = &service.image {
        return image.clone();
    }
    let mut hasher = Sha256::new();
    hasher.update(project.as_bytes());
    hasher.update([0]);
    hasher.update(service.name.as_bytes());
    hasher.update([0]);
    hasher.update(build.context.as_deref().unwrap_or(".").as_bytes());
    hasher.update([0]);
    hasher.update(build.dockerfile.as_deref().unwrap_or("Dockerfile").as_bytes());
    hasher.update([0]);
    hasher.update(sorted_args(&build.args).as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{project}_{}:{}", service.name, &digest[..12])
}

/// The image reference a service's container will run
pub fn effective_image_name(project: &str, service: &Service) -> String {
    if let Some(image) = &service.image {
        image.clone()
    } else if let Some(build) = &service.build {
        build_tag(project, service, build)
    } else {
        // unreachable while the image-or-build invariant holds
        "unknown".to_string()
    }
}

fn sorted_args(args: &BTreeMap<String, String>) -> String {
    args.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Resolve the build context directory and dockerfile path, verifying
/// both exist
fn resolve_build_paths(service: &str, build: &BuildConfig) -> Result<(PathBuf, PathBuf)> {
    let context = PathBuf::from(build.context.as_deref().unwrap_or("."));
    let context = if context.is_absolute() {
        context
    } else {
        std::env::current_dir()?.join(context)
    };
    if !context.is_dir() {
        return Err(Error::not_found(format!(
            "service '{service}': build context {} does not exist",
            context.display()
        )));
    }

    let dockerfile = PathBuf::from(build.dockerfile.as_deref().unwrap_or("Dockerfile"));
    let dockerfile = if dockerfile.is_absolute() {
        dockerfile
    } else {
        context.join(dockerfile)
    };
    if !dockerfile.is_file() {
        return Err(Error::not_found(format!(
            "service '{service}': dockerfile {} does not exist",
            dockerfile.display()
        )));
    }

    Ok((context, dockerfile))
}

impl Orchestrator {
    /// Build every service image that needs one, capped at three builds
    /// in flight. Completed builds land in the cache even when a later
    /// build fails; any failure aborts before containers are touched.
    pub(crate) async fn build_images(
        &self,
        project_name: &str,
        services: &BTreeMap<String, Service>,
    ) -> Result<()> {
        let mut pending: Vec<(BuildCacheKey, String, BuildRequest)> = Vec::new();
        {
            let state = self.state.lock().await;
            for service in services.values() {
                let Some(build) = &service.build else {
                    continue;
                };
                let key = BuildCacheKey {
                    project: project_name.to_string(),
                    service: service.name.clone(),
                    context: build.context.clone().unwrap_or_else(|| ".".to_string()),
                    dockerfile: build
                        .dockerfile
                        .clone()
                        .unwrap_or_else(|| "Dockerfile".to_string()),
                    args: sorted_args(&build.args),
                };
                if state.build_cache.contains_key(&key) {
                    debug!(service = %service.name, "build already cached");
                    continue;
                }
                let (context, dockerfile) = resolve_build_paths(&service.name, build)?;
                let tag = build_tag(project_name, service, build);
                pending.push((
                    key,
                    tag.clone(),
                    BuildRequest {
                        tag,
                        context,
                        dockerfile,
                        args: build.args.clone(),
                        target: build.target.clone(),
                    },
                ));
            }
        }

        if pending.is_empty() {
            return Ok(());
        }
        info!(count = pending.len(), "building service images");

        let builder = self.runtime.builder.clone();
        let concurrency = MAX_CONCURRENT_BUILDS.min(pending.len());
        let results: Vec<(BuildCacheKey, String, Result<()>)> = stream::iter(
            pending.into_iter().map(|(key, tag, request)| {
                let builder = builder.clone();
                async move {
                    let outcome = builder.build(&request).await;
                    (key, tag, outcome)
                }
            }),
        )
        .buffer_unordered(concurrency)
        .collect()
        .await;

        let mut first_error = None;
        {
            let mut state = self.state.lock().await;
            for (key, tag, outcome) in results {
                match outcome {
                    Ok(()) => {
                        state.build_cache.insert(key, tag);
                    }
                    Err(e) if first_error.is_none() => first_error = Some(e),
                    Err(_) => {}
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Builds images by spawning an external builder executable
#[derive(Debug, Clone, Default)]
pub struct ExternalBuilder {
    /// Explicit executable path, bypassing discovery
    explicit_path: Option<PathBuf>,
    /// Executable name used for discovery
    binary_name: Option<String>,
}

impl ExternalBuilder {
    /// Create a builder that discovers the executable at invocation time
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit builder executable
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// Discover under a different executable name
    #[must_use]
    pub fn with_binary_name(mut self, name: impl Into<String>) -> Self {
        self.binary_name = Some(name.into());
        self
    }

    /// Locate the builder: explicit path, `which`, a sibling of the
    /// current executable, well-known locations, and finally the bare
    /// name resolved through `PATH` at spawn time
    fn discover(&self) -> PathBuf {
        if let Some(path) = &self.explicit_path {
            return path.clone();
        }
        let name = self.binary_name.as_deref().unwrap_or(DEFAULT_BUILDER);

        if let Ok(found) = which::which(name) {
            return found;
        }
        if let Ok(current) = std::env::current_exe() {
            if let Some(dir) = current.parent() {
                let sibling = dir.join(name);
                if sibling.is_file() {
                    return sibling;
                }
            }
        }
        for location in STANDARD_LOCATIONS {
            let candidate = Path::new(location).join(name);
            if candidate.is_file() {
                return candidate;
            }
        }
        PathBuf::from(name)
    }
}

#[async_trait]
impl ImageBuilder for ExternalBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<()> {
        let program = self.discover();
        debug!(builder = %program.display(), tag = %request.tag, "invoking image build");

        let mut command = Command::new(&program);
        command.arg("build");
        command.arg("--file").arg(&request.dockerfile);
        for (key, value) in &request.args {
            command.arg("--build-arg").arg(format!("{key}={value}"));
        }
        if let Some(target) = &request.target {
            command.arg("--target").arg(target);
        }
        command.arg("--tag").arg(&request.tag);
        command.arg(&request.context);
        command.current_dir(&request.context);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let output = command.output().await.map_err(|e| {
            Error::internal(format!(
                "failed to spawn builder {}: {e}",
                program.display()
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::internal(format!(
                "build of '{}' failed (exit {}): {}",
                request.tag,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

//! In-memory orchestrator state: per-project container records and the
//! build cache. All mutation happens under the orchestrator's lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// State entries untouched this long are purged
pub const STATE_MAX_AGE: Duration = Duration::from_secs(3600);

/// Mutable orchestrator state, guarded by the orchestrator's mutex
#[derive(Debug, Default)]
pub struct OrchestratorState {
    /// Per-project records, keyed by project name
    pub projects: HashMap<String, ProjectState>,
    /// Completed builds, keyed by build inputs, valued by image tag
    pub build_cache: HashMap<BuildCacheKey, String>,
}

impl OrchestratorState {
    /// Record a reconciled container, refreshing the project timestamp
    pub fn record_container(&mut self, project: &str, record: ContainerRecord) {
        let state = self.projects.entry(project.to_string()).or_default();
        state.last_touched = Instant::now();
        state.containers.insert(record.service.clone(), record);
    }

    /// Mark a project as recently used
    pub fn touch(&mut self, project: &str) {
        self.projects.entry(project.to_string()).or_default().last_touched = Instant::now();
    }

    /// Drop the record for a project entirely
    pub fn forget_project(&mut self, project: &str) {
        self.projects.remove(project);
    }

    /// Remove project entries untouched for longer than [`STATE_MAX_AGE`]
    pub fn purge_stale(&mut self) {
        let now = Instant::now();
        self.projects
            .retain(|_, state| now.duration_since(state.last_touched) <= STATE_MAX_AGE);
    }
}

/// Containers the orchestrator has reconciled for one project
#[derive(Debug)]
pub struct ProjectState {
    /// Records keyed by service name
    pub containers: HashMap<String, ContainerRecord>,
    /// Last time this project was reconciled
    pub last_touched: Instant,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            containers: HashMap::new(),
            last_touched: Instant::now(),
        }
    }
}

/// One reconciled container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Service the container implements
    pub service: String,
    /// Runtime container ID
    pub container_id: String,
    /// Configuration fingerprint at reconcile time
    pub config_hash: String,
    /// Whether an existing container was reused
    pub reused: bool,
}

/// Cache key for one build invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildCacheKey {
    /// Project name
    pub project: String,
    /// Service name
    pub service: String,
    /// Build context path
    pub context: String,
    /// Dockerfile path
    pub dockerfile: String,
    /// Sorted `k=v` build args joined with `,`
    pub args: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(service: &str) -> ContainerRecord {
        ContainerRecord {
            service: service.to_string(),
            container_id: format!("proj_{service}"),
            config_hash: "abc".to_string(),
            reused: false,
        }
    }

    #[test]
    fn test_record_and_touch() {
        let mut state = OrchestratorState::default();
        state.record_container("proj", record("web"));
        assert_eq!(state.projects["proj"].containers.len(), 1);

        state.record_container("proj", record("web"));
        assert_eq!(state.projects["proj"].containers.len(), 1);
    }

    #[test]
    fn test_purge_keeps_fresh_entries() {
        let mut state = OrchestratorState::default();
        state.record_container("proj", record("web"));
        state.purge_stale();
        assert!(state.projects.contains_key("proj"));
    }

    #[test]
    fn test_purge_drops_stale_entries() {
        let mut state = OrchestratorState::default();
        state.record_container("proj", record("web"));
        state.projects.get_mut("proj").unwrap().last_touched =
            Instant::now() - STATE_MAX_AGE - Duration::from_secs(1);
        state.purge_stale();
        assert!(state.projects.is_empty());
    }
}

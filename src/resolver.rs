//! Service dependency resolution: start/stop ordering, parallel groups,
//! cycle detection, and transitive selection.
//!
//! The graph unions all four dependency conditions; a service may begin
//! provisioning once everything it depends on, under any condition, is
//! ahead of it in the order.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::error::{Error, Result};
use crate::project::Service;

/// The resolver's output: a total order plus the safe parallelism
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartPlan {
    /// Services in a valid start order (dependencies first)
    pub start_order: Vec<String>,
    /// Reverse of the start order
    pub stop_order: Vec<String>,
    /// Levels of services with no edges between or within earlier levels;
    /// flattened, equals `start_order`
    pub parallel_groups: Vec<Vec<String>>,
}

/// Compute the start plan for a set of services.
///
/// Fails with not-found if a dependency references an unknown service
/// and with invalid-argument on a dependency cycle (the message carries
/// the cycle path). An empty input produces an empty plan.
pub fn resolve(services: &BTreeMap<String, Service>) -> Result<StartPlan> {
    // adjacency: dependency -> dependents, plus in-degrees for Kahn
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();

    for name in services.keys() {
        in_degree.insert(name, 0);
    }
    for (name, service) in services {
        for dep in service.all_dependencies() {
            if !services.contains_key(dep) {
                return Err(Error::not_found(format!(
                    "service '{name}' depends on unknown service '{dep}'"
                )));
            }
            successors.entry(dep).or_default().push(name);
            if let Some(degree) = in_degree.get_mut(name.as_str()) {
                *degree += 1;
            }
        }
    }

    detect_cycles(services)?;

    let mut frontier: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut start_order = Vec::with_capacity(services.len());
    let mut parallel_groups = Vec::new();

    while !frontier.is_empty() {
        frontier.sort_unstable();
        let group: Vec<String> = frontier.iter().map(ToString::to_string).collect();
        start_order.extend(group.iter().cloned());

        let mut next: Vec<&str> = Vec::new();
        for name in frontier.drain(..) {
            for successor in successors.get(name).into_iter().flatten().copied() {
                let Some(degree) = in_degree.get_mut(successor) else {
                    continue;
                };
                *degree -= 1;
                if *degree == 0 {
                    next.push(successor);
                }
            }
        }
        parallel_groups.push(group);
        frontier = next;
    }

    if start_order.len() != services.len() {
        // the DFS above should have reported the cycle already
        return Err(Error::invalid_argument(
            "circular dependency between services",
        ));
    }

    let stop_order: Vec<String> = start_order.iter().rev().cloned().collect();
    Ok(StartPlan {
        start_order,
        stop_order,
        parallel_groups,
    })
}

/// DFS cycle check producing a readable path
fn detect_cycles(services: &BTreeMap<String, Service>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        services: &'a BTreeMap<String, Service>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(name);
                return Err(Error::invalid_argument(format!(
                    "dependency cycle: {}",
                    cycle.join(" → ")
                )));
            }
            None => {}
        }
        marks.insert(name, Mark::Visiting);
        path.push(name);
        if let Some(service) = services.get(name) {
            for dep in service.all_dependencies() {
                visit(dep, services, marks, path)?;
            }
        }
        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for name in services.keys() {
        visit(name, services, &mut marks, &mut Vec::new())?;
    }
    Ok(())
}

/// Reduce a service map to the requested names plus everything they
/// transitively depend on. Unknown names draw a warning and are skipped.
pub fn filter_with_dependencies(
    services: &BTreeMap<String, Service>,
    requested: &[String],
) -> BTreeMap<String, Service> {
    let mut keep: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for name in requested {
        if services.contains_key(name) {
            queue.push_back(name);
        } else {
            warn!(service = %name, "requested service is not defined; ignoring");
        }
    }

    while let Some(name) = queue.pop_front() {
        if !keep.insert(name) {
            continue;
        }
        if let Some(service) = services.get(name) {
            for dep in service.all_dependencies() {
                if services.contains_key(dep) {
                    queue.push_back(dep);
                }
            }
        }
    }

    services
        .iter()
        .filter(|(name, _)| keep.contains(name.as_str()))
        .map(|(name, service)| (name.clone(), service.clone()))
        .collect()
}

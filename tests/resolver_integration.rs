//! Resolver scenarios driven through the full pipeline: compose text in,
//! start plan out.

use std::fs;
use std::path::Path;

use container_compose::{filter_with_dependencies, load_project, resolve, ComposeLoadOptions};
use tempfile::TempDir;

fn project_from(text: &str) -> container_compose::Project {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("compose.yaml");
    fs::write(&path, text).unwrap();
    load_project(&ComposeLoadOptions {
        paths: vec![path],
        project_name: Some("proj".to_string()),
        ..ComposeLoadOptions::default()
    })
    .unwrap()
}

#[test]
fn linear_dependencies() {
    // seed scenario 1: db <- cache <- web
    let project = project_from(
        "services:\n  db:\n    image: pg\n  cache:\n    image: redis\n    depends_on: [db]\n  web:\n    image: nginx\n    depends_on: [cache]\n",
    );
    let plan = resolve(&project.services).unwrap();
    assert_eq!(plan.start_order, vec!["db", "cache", "web"]);
    assert_eq!(plan.stop_order, vec!["web", "cache", "db"]);
    assert_eq!(
        plan.parallel_groups,
        vec![vec!["db"], vec!["cache"], vec!["web"]]
    );
}

#[test]
fn diamond_with_condition_mix() {
    // seed scenario 2: conditions all contribute edges
    let project = project_from(
        "services:\n  db:\n    image: pg\n    healthcheck:\n      test: pg_isready\n  cache:\n    image: redis\n  api:\n    image: api\n    depends_on:\n      db:\n        condition: service_started\n      cache:\n        condition: service_started\n  web:\n    image: nginx\n    depends_on:\n      api:\n        condition: service_started\n      db:\n        condition: service_healthy\n",
    );
    let plan = resolve(&project.services).unwrap();
    assert_eq!(
        plan.parallel_groups,
        vec![vec!["cache", "db"], vec!["api"], vec!["web"]]
    );
}

#[test]
fn start_order_respects_every_edge() {
    let project = project_from(
        "services:\n  a:\n    image: x\n  b:\n    image: x\n    depends_on: [a]\n  c:\n    image: x\n    depends_on: [a]\n  d:\n    image: x\n    depends_on: [b, c]\n  e:\n    image: x\n",
    );
    let plan = resolve(&project.services).unwrap();

    let index = |name: &str| plan.start_order.iter().position(|n| n == name).unwrap();
    for (service, deps) in [("b", vec!["a"]), ("c", vec!["a"]), ("d", vec!["b", "c"])] {
        for dep in deps {
            assert!(
                index(dep) < index(service),
                "{dep} must start before {service}"
            );
        }
    }

    let flattened: Vec<String> = plan.parallel_groups.concat();
    assert_eq!(flattened, plan.start_order);
}

#[test]
fn transitive_filter_is_closed() {
    let project = project_from(
        "services:\n  db:\n    image: pg\n  cache:\n    image: redis\n    depends_on: [db]\n  web:\n    image: nginx\n    depends_on: [cache]\n  admin:\n    image: adminer\n",
    );
    let filtered = filter_with_dependencies(&project.services, &["web".to_string()]);
    for service in filtered.values() {
        for dep in service.depends_on.iter() {
            assert!(filtered.contains_key(dep), "dependency {dep} missing");
        }
    }
    assert!(!filtered.contains_key("admin"));
}

#[test]
fn missing_compose_file_error_names_the_path() {
    let err = load_project(&ComposeLoadOptions {
        paths: vec![Path::new("/nope/compose.yaml").to_path_buf()],
        ..ComposeLoadOptions::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("/nope/compose.yaml"));
}

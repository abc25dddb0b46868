//! End-to-end tests for the compose pipeline: file loading, `.env`
//! handling, interpolation, merging, and conversion to a project.

use std::fs;
use std::path::Path;

use container_compose::{load_project, ComposeLoadOptions, MountKind, Protocol};
use serial_test::serial;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn options_for(paths: &[&Path]) -> ComposeLoadOptions {
    ComposeLoadOptions {
        paths: paths.iter().map(|p| p.to_path_buf()).collect(),
        project_name: Some("proj".to_string()),
        ..ComposeLoadOptions::default()
    }
}

#[test]
fn load_single_file() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  web:\n    image: nginx\n    ports:\n      - \"8080:80\"\n",
    );

    let project = load_project(&options_for(&[&file])).unwrap();
    assert_eq!(project.name, "proj");
    let web = &project.services["web"];
    assert_eq!(web.image.as_deref(), Some("nginx"));
    assert_eq!(web.ports.len(), 1);
    assert_eq!(web.ports[0].host_port, 8080);
    assert!(project.networks.contains_key("default"));
}

#[test]
fn project_name_defaults_to_directory() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("MyApp");
    fs::create_dir(&sub).unwrap();
    let file = write(&sub, "compose.yaml", "services:\n  web:\n    image: nginx\n");

    let options = ComposeLoadOptions {
        paths: vec![file],
        ..ComposeLoadOptions::default()
    };
    let project = load_project(&options).unwrap();
    assert_eq!(project.name, "myapp");
}

#[test]
#[serial]
fn interpolation_with_default() {
    // seed scenario: ${IMG:-busybox} with IMG unset
    unsafe { std::env::remove_var("IMG") };
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  app:\n    image: ${IMG:-busybox}\n",
    );

    let project = load_project(&options_for(&[&file])).unwrap();
    assert_eq!(project.services["app"].image.as_deref(), Some("busybox"));
}

#[test]
fn interpolation_env_override_wins() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  app:\n    image: ${IMG:-busybox}\n",
    );

    let mut options = options_for(&[&file]);
    options
        .env_overrides
        .insert("IMG".to_string(), "alpine:3.20".to_string());
    let project = load_project(&options).unwrap();
    assert_eq!(project.services["app"].image.as_deref(), Some("alpine:3.20"));
}

#[test]
fn port_range_expansion() {
    // seed scenario: 4510-4512:4510-4512/udp expands to three mappings
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  dns:\n    image: coredns\n    ports:\n      - \"4510-4512:4510-4512/udp\"\n",
    );

    let project = load_project(&options_for(&[&file])).unwrap();
    let ports = &project.services["dns"].ports;
    assert_eq!(ports.len(), 3);
    for (i, port) in ports.iter().enumerate() {
        assert_eq!(port.host_port, 4510 + i as u16);
        assert_eq!(port.container_port, 4510 + i as u16);
        assert_eq!(port.protocol, Protocol::Udp);
    }
}

#[test]
fn mismatched_port_range_fails() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  dns:\n    image: coredns\n    ports:\n      - \"4510-4512:4510-4511\"\n",
    );

    let err = load_project(&options_for(&[&file])).unwrap_err();
    assert_eq!(err.category(), "invalid-argument");
}

#[test]
fn override_file_wins() {
    let dir = TempDir::new().unwrap();
    let base = write(
        dir.path(),
        "compose.yaml",
        "services:\n  web:\n    image: nginx:1.24\n    environment:\n      A: base\n      B: keep\n",
    );
    let overlay = write(
        dir.path(),
        "compose.override.yaml",
        "services:\n  web:\n    image: nginx:1.25\n    environment:\n      A: override\n",
    );

    let project = load_project(&options_for(&[&base, &overlay])).unwrap();
    let web = &project.services["web"];
    assert_eq!(web.image.as_deref(), Some("nginx:1.25"));
    assert_eq!(web.environment.get("A").unwrap(), "override");
    assert_eq!(web.environment.get("B").unwrap(), "keep");
}

#[test]
#[serial]
fn dot_env_feeds_interpolation_but_shell_wins() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), ".env", "FROM_DOTENV=file-value\nSHELL_SET=file-loses\n");
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  app:\n    image: busybox\n    environment:\n      A: ${FROM_DOTENV}\n      B: ${SHELL_SET}\n",
    );

    unsafe {
        std::env::remove_var("FROM_DOTENV");
        std::env::set_var("SHELL_SET", "shell-wins");
    }
    let project = load_project(&options_for(&[&file])).unwrap();
    let env = &project.services["app"].environment;
    assert_eq!(env.get("A").unwrap(), "file-value");
    assert_eq!(env.get("B").unwrap(), "shell-wins");
    unsafe {
        std::env::remove_var("FROM_DOTENV");
        std::env::remove_var("SHELL_SET");
    }
}

#[test]
fn env_file_merged_with_service_override() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "service.env", "PORT=5432\nNAME=from-file\n");
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  db:\n    image: pg\n    env_file: ./service.env\n    environment:\n      NAME: from-service\n",
    );

    let project = load_project(&options_for(&[&file])).unwrap();
    let env = &project.services["db"].environment;
    assert_eq!(env.get("PORT").unwrap(), "5432");
    assert_eq!(env.get("NAME").unwrap(), "from-service");
}

#[test]
fn missing_env_file_fails() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  db:\n    image: pg\n    env_file: ./absent.env\n",
    );

    let err = load_project(&options_for(&[&file])).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn anchors_rejected_unless_allowed() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  web: &base\n    image: nginx\n",
    );

    let err = load_project(&options_for(&[&file])).unwrap_err();
    assert_eq!(err.category(), "invalid-argument");

    let mut options = options_for(&[&file]);
    options.allow_anchors = true;
    load_project(&options).unwrap();
}

#[test]
fn missing_file_is_not_found() {
    let err = load_project(&options_for(&[Path::new("/definitely/absent.yaml")])).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn profiles_filter_applies() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  web:\n    image: nginx\n  tools:\n    image: busybox\n    profiles: [debug]\n",
    );

    let project = load_project(&options_for(&[&file])).unwrap();
    assert!(!project.services.contains_key("tools"));

    let mut options = options_for(&[&file]);
    options.profiles = vec!["debug".to_string()];
    let project = load_project(&options).unwrap();
    assert!(project.services.contains_key("tools"));
}

#[test]
fn selection_is_dependency_closed() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  db:\n    image: pg\n  web:\n    image: nginx\n    depends_on: [db]\n  extra:\n    image: busybox\n",
    );

    let mut options = options_for(&[&file]);
    options.services = vec!["web".to_string()];
    let project = load_project(&options).unwrap();
    assert!(project.services.contains_key("db"));
    assert!(project.services.contains_key("web"));
    assert!(!project.services.contains_key("extra"));
}

#[test]
fn anonymous_volume_keeps_target() {
    // boundary: bare /path becomes an anonymous volume mount
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  app:\n    image: busybox\n    volumes:\n      - /cache\n",
    );

    let project = load_project(&options_for(&[&file])).unwrap();
    let mount = &project.services["app"].volumes[0];
    assert_eq!(mount.kind, MountKind::Volume);
    assert_eq!(mount.source, "");
    assert_eq!(mount.target, "/cache");
}

#[test]
fn depends_on_cycle_fails_with_path() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "compose.yaml",
        "services:\n  a:\n    image: x\n    depends_on: [b]\n  b:\n    image: x\n    depends_on: [a]\n",
    );

    let err = load_project(&options_for(&[&file])).unwrap_err();
    assert!(err.to_string().contains("→"), "{err}");
}

#[test]
fn parse_is_idempotent_over_serialization() {
    use container_compose::compose::parser::parse_compose_text;

    let doc = "services:\n  web:\n    image: nginx\n    environment:\n      A: '1'\n    ports:\n      - \"8080:80\"\n    labels:\n      - tier=web\nnetworks:\n  default:\n    driver: bridge\n";
    let first = parse_compose_text(doc, false).unwrap();
    let serialized = serde_yaml::to_string(&first).unwrap();
    let second = parse_compose_text(&serialized, false).unwrap();
    assert_eq!(
        serde_yaml::to_string(&second).unwrap(),
        serialized,
        "reparsing a serialized document must be stable"
    );
}

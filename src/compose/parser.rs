//! YAML decoding with security limits and post-merge validation.
//!
//! The prescan runs over raw text before handing the document to the
//! YAML decoder, so oversized or hostile input is rejected without
//! building a value tree.

use std::collections::HashMap;

use tracing::warn;

use crate::compose::{ComposeFile, ComposeService, VolumeEntry};
use crate::error::{Error, Result};
use crate::project::{is_valid_env_name, PortMapping, VolumeMount};

/// Maximum accepted document size
const MAX_DOCUMENT_BYTES: usize = 9 * 1024 * 1024;
/// Maximum accepted indentation depth, in spaces
const MAX_INDENT_SPACES: usize = 40;
/// YAML tags accepted without `allow_anchors`-style opt-ins
const SAFE_TAGS: &[&str] = &[
    "str",
    "int",
    "float",
    "bool",
    "null",
    "seq",
    "map",
    "binary",
    "timestamp",
];
/// Compose versions we know; anything else draws a warning
const KNOWN_VERSIONS: &[&str] = &[
    "2", "2.0", "2.1", "2.2", "2.3", "2.4", "3", "3.0", "3.1", "3.2", "3.3", "3.4", "3.5",
    "3.6", "3.7", "3.8", "3.9",
];

/// Decode interpolated compose text into the AST, enforcing the
/// security limits
pub fn parse_compose_text(text: &str, allow_anchors: bool) -> Result<ComposeFile> {
    prescan(text, allow_anchors)?;
    let file: ComposeFile = serde_yaml::from_str(text)?;
    Ok(file)
}

/// Raw-text security limits: size, indentation depth, custom tags,
/// anchors, and merge keys
fn prescan(text: &str, allow_anchors: bool) -> Result<()> {
    if text.len() > MAX_DOCUMENT_BYTES {
        return Err(Error::invalid_argument(format!(
            "compose document exceeds {MAX_DOCUMENT_BYTES} bytes"
        )));
    }

    for (lineno, line) in text.lines().enumerate() {
        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > MAX_INDENT_SPACES {
            return Err(Error::invalid_argument(format!(
                "line {}: indentation deeper than {MAX_INDENT_SPACES} spaces",
                lineno + 1
            )));
        }
        scan_line_tokens(line, lineno + 1, allow_anchors)?;
    }
    Ok(())
}

/// Inspect one line for tags, anchors, and merge keys, skipping quoted
/// regions and comments
fn scan_line_tokens(line: &str, lineno: usize, allow_anchors: bool) -> Result<()> {
    let mut quote: Option<char> = None;
    let mut token_start = true;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                token_start = false;
            }
            '#' if token_start => return Ok(()),
            '!' if token_start => {
                let mut tag = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() {
                        break;
                    }
                    tag.push(next);
                    chars.next();
                }
                check_tag(&tag, lineno)?;
                token_start = false;
            }
            '&' if token_start => {
                if !allow_anchors && chars.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
                    return Err(Error::invalid_argument(format!(
                        "line {lineno}: YAML anchors are not allowed \
                         (enable allow_anchors to accept them)"
                    )));
                }
                token_start = false;
            }
            '<' if token_start => {
                if !allow_anchors && line.trim_start().starts_with("<<:") {
                    return Err(Error::invalid_argument(format!(
                        "line {lineno}: YAML merge keys are not allowed \
                         (enable allow_anchors to accept them)"
                    )));
                }
                token_start = false;
            }
            c if c.is_whitespace() || c == ':' || c == '-' || c == '[' || c == '{' || c == ',' => {
                token_start = true;
            }
            _ => token_start = false,
        }
    }
    Ok(())
}

fn check_tag(tag: &str, lineno: usize) -> Result<()> {
    // "!tag" was consumed as tag="..."; "!!str" arrives as "!str"
    let core = tag.strip_prefix('!').unwrap_or(tag);
    if tag.starts_with('!') && SAFE_TAGS.contains(&core) {
        return Ok(());
    }
    Err(Error::invalid_argument(format!(
        "line {lineno}: unsupported YAML tag '!{tag}'"
    )))
}

/// Validate the merged document per the compose rules.
///
/// Errors abort the load; the version check only warns.
pub fn validate(file: &ComposeFile) -> Result<()> {
    if let Some(version) = &file.version {
        if !KNOWN_VERSIONS.contains(&version.as_str()) {
            warn!(version, "compose file version is outside the known set");
        }
    }

    if file.services.is_empty() {
        return Err(Error::invalid_argument("compose file defines no services"));
    }

    for (name, service) in &file.services {
        validate_service(name, service)?;
    }

    check_dependency_cycles(file)?;
    Ok(())
}

fn validate_service(name: &str, service: &ComposeService) -> Result<()> {
    if service.image.is_none() && service.build.is_none() && service.extends.is_none() {
        return Err(Error::invalid_argument(format!(
            "service '{name}' needs either an image or a build section"
        )));
    }

    if let Some(env) = &service.environment {
        for key in env.to_map().keys() {
            if !is_valid_env_name(key) {
                return Err(Error::invalid_argument(format!(
                    "service '{name}': invalid environment variable name '{key}'"
                )));
            }
        }
    }

    if let Some(ports) = &service.ports {
        for port in ports {
            PortMapping::parse(port).map_err(|e| {
                Error::invalid_argument(format!("service '{name}': {e}"))
            })?;
        }
    }

    if let Some(volumes) = &service.volumes {
        for entry in volumes {
            match entry {
                VolumeEntry::Short(spec) => {
                    VolumeMount::parse_short(spec).map_err(|e| {
                        Error::invalid_argument(format!("service '{name}': {e}"))
                    })?;
                }
                VolumeEntry::Long(long) => {
                    if let Some(kind) = &long.kind {
                        if !matches!(kind.as_str(), "bind" | "volume" | "tmpfs") {
                            return Err(Error::invalid_argument(format!(
                                "service '{name}': unsupported volume type '{kind}'"
                            )));
                        }
                    }
                    if !long.target.starts_with('/') {
                        return Err(Error::invalid_argument(format!(
                            "service '{name}': volume target '{}' must be absolute",
                            long.target
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

/// DFS over `depends_on` edges, reporting the first cycle as a readable
/// path; references to unknown services fail with not-found
fn check_dependency_cycles(file: &ComposeFile) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        file: &ComposeFile,
        marks: &mut HashMap<String, Mark>,
        path: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].iter().map(String::as_str).collect();
                cycle.push(name);
                return Err(Error::invalid_argument(format!(
                    "dependency cycle: {}",
                    cycle.join(" → ")
                )));
            }
            None => {}
        }

        marks.insert(name.to_string(), Mark::Visiting);
        path.push(name.to_string());
        if let Some(service) = file.services.get(name) {
            if let Some(deps) = &service.depends_on {
                for dep in deps.names() {
                    if !file.services.contains_key(&dep) {
                        return Err(Error::not_found(format!(
                            "service '{name}' depends on unknown service '{dep}'"
                        )));
                    }
                    visit(&dep, file, marks, path)?;
                }
            }
        }
        path.pop();
        marks.insert(name.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for name in file.services.keys() {
        visit(name, file, &mut marks, &mut Vec::new())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ComposeFile> {
        parse_compose_text(text, false)
    }

    #[test]
    fn test_parse_minimal_file() {
        let file = parse("services:\n  web:\n    image: nginx\n").unwrap();
        assert!(file.services.contains_key("web"));
        validate(&file).unwrap();
    }

    #[test]
    fn test_rejects_deep_indentation() {
        let line = format!("{}key: value", " ".repeat(41));
        let err = parse(&format!("services:\n{line}\n")).unwrap_err();
        assert!(err.to_string().contains("indentation"));
    }

    #[test]
    fn test_rejects_custom_tag() {
        let err = parse("services: !inject\n  web:\n    image: nginx\n").unwrap_err();
        assert!(err.to_string().contains("tag"));
    }

    #[test]
    fn test_safe_tags_pass_the_prescan() {
        for tag in ["!str", "!int", "!bool", "!timestamp"] {
            check_tag(tag, 1).unwrap();
        }
        assert!(check_tag("inject", 1).is_err());
        assert!(check_tag("!python/object", 1).is_err());
    }

    #[test]
    fn test_rejects_anchor_by_default() {
        let text = "services:\n  web: &base\n    image: nginx\n";
        let err = parse(text).unwrap_err();
        assert!(err.to_string().contains("anchors"));

        // allowed when opted in
        parse_compose_text(text, true).unwrap();
    }

    #[test]
    fn test_rejects_merge_key_by_default() {
        let text = "services:\n  web:\n    <<: {image: nginx}\n";
        let err = parse(text).unwrap_err();
        assert!(err.to_string().contains("merge keys"));
    }

    #[test]
    fn test_anchor_like_text_in_quotes_is_fine() {
        let file =
            parse("services:\n  web:\n    image: nginx\n    command: \"echo &x !tag\"\n").unwrap();
        assert!(file.services["web"].command.is_some());
    }

    #[test]
    fn test_validate_requires_services() {
        let file = parse("services: {}\n").unwrap();
        let err = validate(&file).unwrap_err();
        assert!(err.to_string().contains("no services"));
    }

    #[test]
    fn test_validate_requires_image_or_build() {
        let file = parse("services:\n  web:\n    tty: true\n").unwrap();
        let err = validate(&file).unwrap_err();
        assert!(err.to_string().contains("image or a build"));
    }

    #[test]
    fn test_validate_rejects_bad_env_name() {
        let file =
            parse("services:\n  web:\n    image: nginx\n    environment:\n      BAD-NAME: x\n")
                .unwrap();
        let err = validate(&file).unwrap_err();
        assert_eq!(err.category(), "invalid-argument");
    }

    #[test]
    fn test_validate_rejects_bad_port() {
        let file =
            parse("services:\n  web:\n    image: nginx\n    ports:\n      - 8080:80:90:100\n")
                .unwrap();
        assert!(validate(&file).is_err());
    }

    #[test]
    fn test_validate_detects_self_cycle() {
        let file = parse(
            "services:\n  web:\n    image: nginx\n    depends_on:\n      - web\n",
        )
        .unwrap();
        let err = validate(&file).unwrap_err();
        assert!(err.to_string().contains("web → web"));
    }

    #[test]
    fn test_validate_detects_cycle_path() {
        let file = parse(
            "services:\n  a:\n    image: x\n    depends_on: [b]\n  b:\n    image: x\n    depends_on: [c]\n  c:\n    image: x\n    depends_on: [a]\n",
        )
        .unwrap();
        let err = validate(&file).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("→"), "unexpected message: {message}");
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let file = parse(
            "services:\n  web:\n    image: nginx\n    depends_on:\n      - ghost\n",
        )
        .unwrap();
        let err = validate(&file).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_version_outside_known_set_only_warns() {
        let file = parse("version: \"9.7\"\nservices:\n  web:\n    image: nginx\n").unwrap();
        validate(&file).unwrap();
    }
}

//! `.env` discovery and `KEY=VAL` environment file parsing.
//!
//! The same line grammar backs two features: the `.env` file loaded from
//! each compose file's directory, and the files a service lists under
//! `env_file:`.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};
use crate::project::is_valid_env_name;

/// Warn above this `.env` size
const MAX_DOT_ENV_BYTES: u64 = 1024 * 1024;

/// Load `dir/.env` into the process environment.
///
/// Shell environment wins: keys already set are left alone. Invalid
/// names are warned and skipped; oversized or group/other-readable files
/// produce warnings but still load.
pub fn load_dot_env(dir: &Path) {
    let path = dir.join(".env");
    let Ok(metadata) = std::fs::metadata(&path) else {
        return;
    };
    if !metadata.is_file() {
        return;
    }
    if metadata.len() > MAX_DOT_ENV_BYTES {
        warn!(path = %path.display(), size = metadata.len(), "unusually large .env file");
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o044 != 0 {
            warn!(path = %path.display(), "environment file is readable by group or others");
        }
    }

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read .env file");
            return;
        }
    };

    let parsed = match parse_env_text(&text, &|name| std::env::var(name).ok()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse .env file");
            return;
        }
    };

    for (key, value) in parsed {
        if std::env::var_os(&key).is_none() {
            // Safety: callers load compose files before spawning tasks,
            // so no other thread is reading the environment here
            unsafe { std::env::set_var(&key, &value) };
        }
    }
}

/// Read and parse one `env_file:` entry.
///
/// Relative paths (including the `./` form) resolve against `base_dir`;
/// a leading `~` expands to the user's home directory.
pub fn read_env_file(entry: &str, base_dir: &Path) -> Result<Vec<(String, String)>> {
    let path = resolve_path(entry, base_dir);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| Error::not_found(format!("env file {}: {e}", path.display())))?;
    parse_env_text(&text, &|name| std::env::var(name).ok())
}

/// Expand `~` and anchor relative paths at `base_dir`
pub fn resolve_path(entry: &str, base_dir: &Path) -> PathBuf {
    if let Some(rest) = entry.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    let path = PathBuf::from(entry);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

/// Parse `KEY=VAL` text into ordered pairs.
///
/// Grammar: blank lines and `#` comments skipped; optional `export `
/// prefix; single-quoted values literal; double-quoted values unescape
/// `\n`, `\t`, `\"`, `\\`; unquoted and double-quoted values expand
/// `${VAR}`/`$VAR` against keys defined earlier in the file, then
/// `fallback`. Lines with invalid names are warned and skipped.
pub fn parse_env_text(
    text: &str,
    fallback: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<(String, String)>> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

        let Some((key, value)) = line.split_once('=') else {
            warn!(line = lineno + 1, "skipping malformed environment line");
            continue;
        };
        let key = key.trim();
        if !is_valid_env_name(key) {
            warn!(line = lineno + 1, key, "skipping invalid environment variable name");
            continue;
        }

        let value = value.trim();
        let resolved = if let Some(inner) = unquote(value, '\'') {
            inner.to_string()
        } else if let Some(inner) = unquote(value, '"') {
            let unescaped = unescape_double_quoted(inner);
            expand(&unescaped, &pairs, fallback)?
        } else {
            expand(value, &pairs, fallback)?
        };

        pairs.retain(|(k, _)| k != key);
        pairs.push((key.to_string(), resolved));
    }

    Ok(pairs)
}

fn unquote(value: &str, quote: char) -> Option<&str> {
    let stripped = value.strip_prefix(quote)?;
    stripped.strip_suffix(quote)
}

fn unescape_double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// `${VAR}`/`$VAR` expansion against earlier keys, then the fallback
fn expand(
    value: &str,
    prior: &[(String, String)],
    fallback: &dyn Fn(&str) -> Option<String>,
) -> Result<String> {
    crate::compose::interpolate::interpolate(value, &|name| {
        prior
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .or_else(|| fallback(name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<(String, String)> {
        parse_env_text(text, &|_| None).unwrap()
    }

    #[test]
    fn test_basic_pairs_and_comments() {
        let pairs = parse("# header\nFOO=bar\n\nBAZ=qux\n");
        assert_eq!(
            pairs,
            vec![
                ("FOO".to_string(), "bar".to_string()),
                ("BAZ".to_string(), "qux".to_string())
            ]
        );
    }

    #[test]
    fn test_export_prefix() {
        let pairs = parse("export DATABASE_URL=postgres://db:5432");
        assert_eq!(pairs[0].0, "DATABASE_URL");
        assert_eq!(pairs[0].1, "postgres://db:5432");
    }

    #[test]
    fn test_single_quotes_are_literal() {
        let pairs = parse("MSG='hello $WORLD'");
        assert_eq!(pairs[0].1, "hello $WORLD");
    }

    #[test]
    fn test_double_quotes_unescape_and_expand() {
        let pairs = parse("HOST=db\nURL=\"tcp://${HOST}:5432\\n\"");
        assert_eq!(pairs[1].1, "tcp://db:5432\n");
    }

    #[test]
    fn test_expansion_against_prior_keys() {
        let pairs = parse("BASE=/srv\nDATA=$BASE/data");
        assert_eq!(pairs[1].1, "/srv/data");
    }

    #[test]
    fn test_expansion_fallback() {
        let pairs = parse_env_text("DIR=${MISSING:-/tmp}", &|_| None).unwrap();
        assert_eq!(pairs[0].1, "/tmp");

        let pairs =
            parse_env_text("DIR=$OUTER", &|name| (name == "OUTER").then(|| "/x".to_string()))
                .unwrap();
        assert_eq!(pairs[0].1, "/x");
    }

    #[test]
    fn test_invalid_names_skipped() {
        let pairs = parse("2BAD=skip\nGOOD=keep");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "GOOD");
    }

    #[test]
    fn test_later_definition_wins() {
        let pairs = parse("A=1\nA=2");
        assert_eq!(pairs, vec![("A".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_resolve_path_relative() {
        let base = Path::new("/projects/app");
        assert_eq!(
            resolve_path("./conf/.env.db", base),
            PathBuf::from("/projects/app/conf/.env.db")
        );
        assert_eq!(resolve_path("/etc/env", base), PathBuf::from("/etc/env"));
    }
}

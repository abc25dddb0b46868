//! Environment variable interpolation over raw compose file text.
//!
//! Substitution runs before YAML decoding. Supported forms are `${NAME}`,
//! `${NAME:-DEFAULT}`, and `$NAME`; `$$` escapes a literal dollar sign.

use crate::error::{Error, Result};
use crate::project::is_valid_env_name;

/// Substitute variables in `text` using `lookup`.
///
/// Unset variables without a `:-` default substitute the empty string.
/// A `$` that does not begin a valid variable reference is an error.
pub fn interpolate(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                chars.next();
                let start = idx;
                let mut body = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    body.push(c);
                }
                if !closed {
                    return Err(Error::invalid_argument(format!(
                        "unterminated variable reference starting at offset {start}"
                    )));
                }
                out.push_str(&expand_braced(&body, lookup)?);
            }
            _ => {
                let mut name = String::new();
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if !is_valid_env_name(&name) {
                    return Err(Error::invalid_argument(format!(
                        "invalid variable reference '${name}' at offset {idx}"
                    )));
                }
                out.push_str(&lookup(&name).unwrap_or_default());
            }
        }
    }
    Ok(out)
}

/// Expand the body of a `${...}` reference
fn expand_braced(body: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let (name, default) = match body.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (body, None),
    };
    if !is_valid_env_name(name) {
        return Err(Error::invalid_argument(format!(
            "invalid variable name '{name}' in interpolation"
        )));
    }
    Ok(match lookup(name) {
        Some(value) => value,
        None => default.unwrap_or_default().to_string(),
    })
}

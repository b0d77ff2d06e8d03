// src/package/spec.rs

//! Package specifier grammar
//!
//! ```text
//! spec   := slug | name "@" origin | origin
//! slug   := [a-z0-9]+ ("-" [a-z0-9]+)*
//! ```
//!
//! Names are lowercased and `_` is normalized to `-` before matching.

use crate::error::{Error, Result};

/// A specifier split into its optional halves; at least one is present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpec {
    pub name: Option<String>,
    pub origin: Option<String>,
}

/// Lowercase and replace underscores with hyphens
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace('_', "-")
}

/// Whether `name` (already normalized) matches the slug grammar
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('-')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()))
}

/// Validate a normalized name
pub fn check_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Split a command-line or manifest specifier
pub fn parse_spec(spec: &str) -> Result<ParsedSpec> {
    let name = normalize_name(spec);
    if is_valid_name(&name) {
        return Ok(ParsedSpec {
            name: Some(name),
            origin: None,
        });
    }

    if let Some((name, origin)) = spec.split_once('@') {
        let name = normalize_name(name);
        check_name(&name)?;
        return Ok(ParsedSpec {
            name: Some(name),
            origin: Some(origin.trim_start().to_string()),
        });
    }

    Ok(ParsedSpec {
        name: None,
        origin: Some(spec.to_string()),
    })
}

/// Infer a package name from the last segment of a URL or path
///
/// `https://host/org/my_pkg.git` yields `my-pkg`.
pub fn infer_name(origin: &str) -> Result<String> {
    let last = origin
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let stem = last.split('.').next().unwrap_or_default();
    let name = normalize_name(stem);
    check_name(&name)?;
    Ok(name)
}

// src/compat.rs

//! Host toolchain version compatibility
//!
//! Specifiers are `==N`, `!=N`, `>=N`, `>N`, `<=N` or `<N`. Two distros
//! share the ecosystem and number their releases differently (`11`, `12`
//! vs `2312`, `2406`), so a specifier only counts when it belongs to the
//! same numbering family as the host.

use crate::error::{Error, Result};
use tracing::warn;

/// Versions at or above this belong to the date-numbered family
pub const FAMILY_THRESHOLD: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

impl Op {
    fn holds(self, host: u32, version: u32) -> bool {
        match self {
            Op::Eq => host == version,
            Op::Ne => host != version,
            Op::Ge => host >= version,
            Op::Gt => host > version,
            Op::Le => host <= version,
            Op::Lt => host < version,
        }
    }
}

/// A parsed version specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionSpec {
    op: Op,
    version: u32,
}

impl VersionSpec {
    /// Parse a specifier; `None` if it is not understood
    pub fn parse(spec: &str) -> Option<Self> {
        // Two-character operators first so ">=" is not read as ">"
        const OPS: &[(&str, Op)] = &[
            ("==", Op::Eq),
            ("!=", Op::Ne),
            (">=", Op::Ge),
            ("<=", Op::Le),
            (">", Op::Gt),
            ("<", Op::Lt),
        ];

        let spec = spec.trim();
        OPS.iter().find_map(|(prefix, op)| {
            let rest = spec.strip_prefix(prefix)?;
            let version = rest.trim().parse().ok()?;
            Some(Self { op: *op, version })
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether this specifier applies to the host's numbering family
    pub fn same_family(&self, host: u32) -> bool {
        (host < FAMILY_THRESHOLD) == (self.version < FAMILY_THRESHOLD)
    }

    pub fn matches(&self, host: u32) -> bool {
        self.op.holds(host, self.version)
    }
}

/// Check a package's declared specifiers against the host version
///
/// Unparsable specifiers are warned about and ignored. With specifiers
/// declared, at least one must be of the host's family and every such one
/// must hold.
pub fn check(package: &str, specs: &[String], host: u32) -> Result<()> {
    let mut family_matched = false;

    for raw in specs {
        let Some(spec) = VersionSpec::parse(raw) else {
            warn!("{}: ignoring invalid version specifier '{}'", package, raw);
            continue;
        };

        if !spec.same_family(host) {
            continue;
        }
        family_matched = true;

        if !spec.matches(host) {
            return Err(Error::VersionMismatch {
                package: package.to_string(),
                host,
                spec: raw.clone(),
            });
        }
    }

    if !specs.is_empty() && !family_matched {
        return Err(Error::IncompatibleDistribution {
            package: package.to_string(),
            specs: specs.to_vec(),
        });
    }

    Ok(())
}

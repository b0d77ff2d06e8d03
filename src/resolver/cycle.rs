// src/resolver/cycle.rs

//! Cycle detection over the resolved set
//!
//! Resolution stops at installed packages and at anything already visited,
//! so it finishing says nothing about whether the requirement graph is
//! acyclic. This check runs once over the resolved set before anything is
//! built, following only requirement edges between resolved packages.

use super::PackageSet;
use crate::context::Context;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    InProgress,
    Done,
}

/// Requirement graph restricted to one resolved set
#[derive(Debug, Default)]
pub struct CycleDetector {
    /// Package name to the names it requires
    edges: BTreeMap<String, Vec<String>>,
}

impl CycleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package and its requirements
    ///
    /// Requirements that never get added as packages themselves are
    /// ignored by the search.
    pub fn add_package<I, S>(&mut self, name: &str, requires: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edges
            .entry(name.to_string())
            .or_default()
            .extend(requires.into_iter().map(Into::into));
    }

    /// Build the graph for a resolved set
    ///
    /// Names are unique within the set (checked beforehand), so edges are
    /// keyed by name; a requirement counts only if its identity is in the
    /// set.
    pub fn from_resolved(ctx: &Context, resolved: &PackageSet) -> Result<Self> {
        let mut detector = Self::new();
        for pkg in resolved {
            let requires: Vec<String> = pkg
                .requested_dependencies(ctx)?
                .into_iter()
                .filter(|dep| resolved.contains(dep))
                .map(|dep| dep.name().to_string())
                .collect();
            detector.add_package(pkg.name(), requires);
        }
        Ok(detector)
    }

    /// First cycle found, as the path from the repeated package back to it
    ///
    /// A package requiring itself yields `[a, a]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut colors: HashMap<&str, Color> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();

        for start in self.edges.keys() {
            if !colors.contains_key(start.as_str())
                && let Some(cycle) = self.visit(start, &mut colors, &mut path)
            {
                return Some(cycle);
            }
        }
        None
    }

    /// Fail with the cycle path if the graph has one
    pub fn check(&self) -> Result<()> {
        match self.find_cycle() {
            Some(cycle) => Err(Error::DependencyCycle(cycle)),
            None => Ok(()),
        }
    }

    fn visit<'g>(
        &'g self,
        node: &'g str,
        colors: &mut HashMap<&'g str, Color>,
        path: &mut Vec<&'g str>,
    ) -> Option<Vec<String>> {
        colors.insert(node, Color::InProgress);
        path.push(node);

        for dep in self.edges.get(node).into_iter().flatten() {
            if !self.edges.contains_key(dep) {
                continue;
            }
            match colors.get(dep.as_str()) {
                Some(Color::InProgress) => {
                    let start = path.iter().position(|n| *n == dep).unwrap_or_default();
                    let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                Some(Color::Done) => {}
                None => {
                    if let Some(cycle) = self.visit(dep, colors, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        colors.insert(node, Color::Done);
        None
    }
}

// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Include expansion and requirement sets for declared environments.

use std::collections::BTreeSet;

use crate::ProjectSpec;

#[cfg(test)]
#[path = "./compose_test.rs"]
mod compose_test;

/// An environment with its direct includes folded in.
#[derive(Debug, Clone, Default)]
pub struct ComposedEnvironment {
    /// Environment name.
    pub name: String,

    /// Requirement strings, own packages first, then each include's in order.
    pub packages: Vec<String>,

    /// Environments that contributed packages, starting with this one.
    pub sources: Vec<String>,
}

impl ComposedEnvironment {
    /// Normalized package names required by this environment.
    pub fn required_names(&self) -> BTreeSet<String> {
        self.packages
            .iter()
            .map(|spec| normalize_name(requirement_name(spec)))
            .collect()
    }
}

/// Fold an environment's direct includes into a single package list.
///
/// Only one level is expanded: an included environment's own includes are
/// not followed.
pub fn compose_environment(project: &ProjectSpec, name: &str) -> crate::Result<ComposedEnvironment> {
    let env = project
        .environment(name)
        .ok_or_else(|| crate::Error::LockMissingEnvironment(name.to_string()))?;

    let mut composed = ComposedEnvironment {
        name: env.name.clone(),
        packages: env.packages.clone(),
        sources: vec![env.name.clone()],
    };

    for include in &env.includes {
        let included = project
            .environment(include)
            .ok_or_else(|| crate::Error::MissingInclude {
                environment: env.name.clone(),
                include: include.clone(),
            })?;
        composed.packages.extend(included.packages.iter().cloned());
        composed.sources.push(included.name.clone());
    }

    Ok(composed)
}

/// Sorted, deduplicated union of every environment's requirement strings.
pub fn union_closure(project: &ProjectSpec) -> Vec<String> {
    project
        .environments
        .iter()
        .flat_map(|env| env.packages.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distribution name at the front of a requirement string.
///
/// `requests[socks]>=2; python_version > "3"` yields `requests`.
pub fn requirement_name(spec: &str) -> &str {
    let spec = spec.trim();
    let end = spec
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(spec.len());
    &spec[..end]
}

/// Normalize a distribution name: lowercase, runs of `-`, `_`, `.` become `-`.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            separator = true;
            continue;
        }
        if separator && !normalized.is_empty() {
            normalized.push('-');
        }
        separator = false;
        normalized.push(c.to_ascii_lowercase());
    }
    normalized
}

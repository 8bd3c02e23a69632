// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Project declaration parsing from the `[tool.pipy]` table of pyproject.toml.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "./spec_test.rs"]
mod spec_test;

/// Helper for two-stage deserialization: locate `[tool.pipy]` first.
#[derive(Deserialize)]
struct PyProjectMapping {
    #[serde(default)]
    tool: Option<ToolMapping>,
}

#[derive(Deserialize)]
struct ToolMapping {
    #[serde(default)]
    pipy: Option<toml::Value>,
}

/// A named set of required packages.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EnvironmentSpec {
    /// Unique environment name.
    pub name: String,

    /// Requirement strings, e.g. `requests` or `pytest>=7`.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Names of other environments whose packages this one also requires.
    /// Only direct references are expanded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
}

/// A named list of commands to run inside a session.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AliasSpec {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// Main project declaration from `[tool.pipy]`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProjectSpec {
    /// Project name, used to address sessions.
    pub name: String,

    /// Supported interpreter versions.
    #[serde(default)]
    pub versions: Vec<String>,

    /// Declared environments.
    #[serde(default)]
    pub environments: Vec<EnvironmentSpec>,

    /// Declared command aliases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<AliasSpec>,

    /// Path to the file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl ProjectSpec {
    /// Parse the `[tool.pipy]` table out of a pyproject.toml document.
    ///
    /// `path` is only used for error reporting.
    pub fn from_toml(content: &str, path: &Path) -> crate::Result<Self> {
        let invalid = |error: toml::de::Error| crate::Error::InvalidToml {
            path: path.to_path_buf(),
            error,
        };

        // Stage 1: find the tool table
        let mapping: PyProjectMapping = toml::from_str(content).map_err(invalid)?;
        let table = mapping
            .tool
            .and_then(|tool| tool.pipy)
            .ok_or_else(|| crate::Error::NotAPipyProject(path.to_path_buf()))?;

        // Stage 2: deserialize the project itself
        let spec = table.try_into::<ProjectSpec>().map_err(invalid)?;
        Ok(spec)
    }

    /// Load spec from a pyproject.toml path.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| crate::Error::ReadFailed {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut spec = Self::from_toml(&content, path)?;
        spec.source_path = Some(path.to_path_buf());
        if spec.alias("setup").is_none() {
            tracing::warn!(
                "Expected required alias \"setup\". Add to pyproject.toml:\n\
                 [[tool.pipy.aliases]]\nname = \"setup\"\ncommands = [...]"
            );
        }
        Ok(spec)
    }

    /// Directory containing the project file, mounted into every session.
    pub fn root(&self) -> crate::Result<PathBuf> {
        let parent = self
            .source_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        dunce::canonicalize(parent).map_err(|e| crate::Error::ReadFailed {
            path: parent.to_path_buf(),
            error: e,
        })
    }

    /// Look up a declared environment by name.
    pub fn environment(&self, name: &str) -> Option<&EnvironmentSpec> {
        self.environments.iter().find(|env| env.name == name)
    }

    /// Look up a declared alias by name.
    pub fn alias(&self, name: &str) -> Option<&AliasSpec> {
        self.aliases.iter().find(|alias| alias.name == name)
    }

    /// Check everything a lock run needs before any session is started.
    pub fn validate(&self) -> crate::Result<()> {
        if self.environments.is_empty() {
            return Err(crate::Error::MissingEnvironments);
        }
        if self.versions.is_empty() {
            return Err(crate::Error::MissingVersions);
        }

        let mut seen = HashSet::new();
        for env in &self.environments {
            if !seen.insert(env.name.as_str()) {
                return Err(crate::Error::DuplicateEnvironment(env.name.clone()));
            }
        }

        for env in &self.environments {
            for include in &env.includes {
                if !seen.contains(include.as_str()) {
                    return Err(crate::Error::MissingInclude {
                        environment: env.name.clone(),
                        include: include.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

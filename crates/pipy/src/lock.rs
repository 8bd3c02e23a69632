// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Lock file structures and the engine that produces them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::Path;

use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::compose::{compose_environment, normalize_name, union_closure};
use crate::executor::shell_quote;
use crate::hashes::HashResolver;
use crate::session::{Lease, Lifetime, SessionKey, SessionManager};
use crate::ProjectSpec;

#[cfg(test)]
#[path = "./lock_test.rs"]
mod lock_test;

/// One exactly pinned package.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PackageLock {
    pub name: String,
    pub version: String,
    pub hashes: Vec<String>,
}

impl PackageLock {
    /// `name==version` requirement for the installer.
    pub fn pin(&self) -> String {
        format!("{}=={}", self.name, self.version)
    }
}

/// Packages locked for one environment and interpreter version.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VersionLock {
    #[serde(default)]
    pub packages: Vec<PackageLock>,
}

/// Lock document: environment name -> interpreter version -> packages.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LockFile {
    pub environments: BTreeMap<String, BTreeMap<String, VersionLock>>,
}

impl LockFile {
    /// Parse a lock document; `path` is only used for error reporting.
    pub fn from_toml(content: &str, path: &Path) -> crate::Result<Self> {
        toml::from_str(content).map_err(|error| crate::Error::InvalidLock {
            path: path.to_path_buf(),
            error,
        })
    }

    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Load a lock document from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(crate::Error::LockNotFound(path.to_path_buf()));
            }
            Err(error) => {
                return Err(crate::Error::ReadFailed {
                    path: path.to_path_buf(),
                    error,
                });
            }
        };
        Self::from_toml(&content, path)
    }

    /// Write the document atomically: readers see the old file or the new
    /// one, never a partial write.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        let write_failed = |error| crate::Error::WriteFailed {
            path: path.to_path_buf(),
            error,
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_failed)?;
        tmp.write_all(content.as_bytes()).map_err(write_failed)?;
        tmp.as_file().sync_all().map_err(write_failed)?;
        tmp.persist(path).map_err(|err| write_failed(err.error))?;
        Ok(())
    }

    /// Packages locked for `environment` at `version`.
    pub fn packages(&self, environment: &str, version: &str) -> crate::Result<&[PackageLock]> {
        let versions = self
            .environments
            .get(environment)
            .ok_or_else(|| crate::Error::LockMissingEnvironment(environment.to_string()))?;
        let locked = versions
            .get(version)
            .ok_or_else(|| crate::Error::LockMissingVersion {
                environment: environment.to_string(),
                version: version.to_string(),
            })?;
        Ok(&locked.packages)
    }
}

/// Resolves every declared environment for every declared interpreter version.
pub struct LockEngine<'a> {
    sessions: &'a SessionManager,
    resolver: &'a dyn HashResolver,
}

impl<'a> LockEngine<'a> {
    pub fn new(sessions: &'a SessionManager, resolver: &'a dyn HashResolver) -> Self {
        Self { sessions, resolver }
    }

    /// Generate a lock document for the project.
    ///
    /// Declarations are validated before any session is started. The union of
    /// all environments' packages is installed once per version, so every
    /// environment shares the same pins for packages they have in common.
    #[tracing::instrument(skip_all, fields(project = %project.name))]
    pub async fn generate_lock(&self, project: &ProjectSpec) -> crate::Result<LockFile> {
        project.validate()?;

        let mut required = Vec::with_capacity(project.environments.len());
        for env in &project.environments {
            let composed = compose_environment(project, &env.name)?;
            required.push((env.name.clone(), composed.required_names()));
        }

        let union = union_closure(project);
        let union = &union;
        let jobs = self.sessions.config().jobs.max(1);
        let resolved: crate::Result<Vec<(String, BTreeMap<String, PackageLock>)>> =
            stream::iter(&project.versions)
                .map(|version| async move {
                    let packages = self.lock_version(&project.name, version, union).await?;
                    Ok::<_, crate::Error>((version.clone(), packages))
                })
                .buffered(jobs)
                .try_collect()
                .await;
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                // versions still in flight were dropped before they could release
                self.sessions.release_all().await;
                return Err(err);
            }
        };

        let mut lock = LockFile::default();
        for (version, packages) in &resolved {
            for (environment, names) in &required {
                let mut selected: Vec<PackageLock> = packages
                    .iter()
                    .filter(|(normalized, _)| names.contains(*normalized))
                    .map(|(_, package)| package.clone())
                    .collect();
                selected.sort_by(|a, b| a.name.cmp(&b.name));
                tracing::debug!(environment, version, count = selected.len(), "locked");

                lock.environments
                    .entry(environment.clone())
                    .or_default()
                    .insert(version.clone(), VersionLock { packages: selected });
            }
        }

        Ok(lock)
    }

    /// Resolve the union closure for one version and hash every pinned package.
    ///
    /// Results are keyed by normalized package name.
    async fn lock_version(
        &self,
        project: &str,
        version: &str,
        union: &[String],
    ) -> crate::Result<BTreeMap<String, PackageLock>> {
        tracing::info!("Locking packages for Python {version}");

        let key = SessionKey::new(format!("{project}-lock"), version);
        let lease = self.sessions.acquire(key, Lifetime::Transient).await?;
        let outcome = resolve_in(&lease, union).await;
        let pinned = lease.release_with(outcome).await?;

        let mut packages = BTreeMap::new();
        for (name, pinned_version) in pinned {
            tracing::info!("Locking: {name}=={pinned_version}");
            let hashes = self.resolver.hashes(&name, &pinned_version, version).await?;
            packages.insert(
                normalize_name(&name),
                PackageLock {
                    name,
                    version: pinned_version,
                    hashes,
                },
            );
        }
        Ok(packages)
    }
}

/// Let the installer pick versions for `requirements`, then read back what it chose.
async fn resolve_in(lease: &Lease<'_>, requirements: &[String]) -> crate::Result<Vec<(String, String)>> {
    lease.execute("python -m pip install --upgrade pip").await?;
    if !requirements.is_empty() {
        let specs: Vec<String> = requirements.iter().map(|r| shell_quote(r)).collect();
        lease
            .execute(&format!("python -m pip install --upgrade {}", specs.join(" ")))
            .await?;
    }
    let frozen = lease
        .execute("python -m pip freeze --exclude-editable")
        .await?;
    parse_freeze(&frozen)
}

/// Parse `pip freeze` output into `(name, version)` pairs.
pub fn parse_freeze(output: &str) -> crate::Result<Vec<(String, String)>> {
    let mut pinned = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, version) = line
            .split_once("==")
            .ok_or_else(|| crate::Error::UnpinnableRequirement(line.to_string()))?;
        pinned.push((name.trim().to_string(), version.trim().to_string()));
    }
    Ok(pinned)
}

/// Verify a lock document still covers the project's declarations.
pub fn verify_lock(lock: &LockFile, project: &ProjectSpec) -> crate::Result<Vec<LockChange>> {
    let mut changes = Vec::new();
    let declared_versions: BTreeSet<&str> = project.versions.iter().map(String::as_str).collect();

    for env in &project.environments {
        let Some(locked_versions) = lock.environments.get(&env.name) else {
            changes.push(LockChange::new(LockChangeKind::EnvironmentAdded, &env.name));
            continue;
        };

        let required = compose_environment(project, &env.name)?.required_names();
        for version in &declared_versions {
            let Some(locked) = locked_versions.get(*version) else {
                changes.push(
                    LockChange::new(LockChangeKind::VersionAdded, &env.name).version(version),
                );
                continue;
            };

            let present: BTreeSet<String> = locked
                .packages
                .iter()
                .map(|p| normalize_name(&p.name))
                .collect();
            for name in required.difference(&present) {
                changes.push(
                    LockChange::new(LockChangeKind::PackageMissing, &env.name)
                        .version(version)
                        .package(name),
                );
            }
        }

        for version in locked_versions.keys() {
            if !declared_versions.contains(version.as_str()) {
                changes.push(
                    LockChange::new(LockChangeKind::VersionRemoved, &env.name).version(version),
                );
            }
        }
    }

    for name in lock.environments.keys() {
        if project.environment(name).is_none() {
            changes.push(LockChange::new(LockChangeKind::EnvironmentRemoved, name));
        }
    }

    Ok(changes)
}

/// A single detected difference between a lock and the declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockChange {
    pub kind: LockChangeKind,
    pub environment: String,
    pub version: Option<String>,
    pub package: Option<String>,
}

impl LockChange {
    fn new(kind: LockChangeKind, environment: &str) -> Self {
        Self {
            kind,
            environment: environment.to_string(),
            version: None,
            package: None,
        }
    }

    fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    fn package(mut self, package: &str) -> Self {
        self.package = Some(package.to_string());
        self
    }
}

impl fmt::Display for LockChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.environment)?;
        if let Some(version) = &self.version {
            write!(f, " (Python {version})")?;
        }
        if let Some(package) = &self.package {
            write!(f, " {package}")?;
        }
        Ok(())
    }
}

/// Types of lock mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockChangeKind {
    EnvironmentAdded,
    EnvironmentRemoved,
    VersionAdded,
    VersionRemoved,
    PackageMissing,
}

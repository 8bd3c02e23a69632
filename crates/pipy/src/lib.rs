// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! pipy - Containerized Python Environments with Reproducible Locks
//!
//! This crate provides the core library for running a Python project inside
//! per-version containers ("sessions") and locking its declared package sets.
//!
//! # Overview
//!
//! A project declares interpreter versions and named environments in the
//! `[tool.pipy]` table of its `pyproject.toml`. Locking installs the union of
//! every environment's packages once per version in a throwaway session, then
//! records each environment's subset with exact versions and sha512 digests.
//! Installs and syncs replay those pins into sessions.
//!
//! # Example
//!
//! ```toml
//! [tool.pipy]
//! name = "demo"
//! versions = ["3.9", "3.10"]
//!
//! [[tool.pipy.environments]]
//! name = "base"
//! packages = ["requests"]
//!
//! [[tool.pipy.environments]]
//! name = "test"
//! packages = ["pytest>=7"]
//! includes = ["base"]
//!
//! [[tool.pipy.aliases]]
//! name = "setup"
//! commands = ["python -m pip install -e ."]
//! ```

pub mod compose;
pub mod config;
pub mod error;
pub mod executor;
pub mod hashes;
pub mod install;
pub mod lock;
pub mod session;
pub mod spec;

#[cfg(test)]
mod fixtures;

pub use compose::{compose_environment, union_closure, ComposedEnvironment};
pub use config::Config;
pub use error::{Error, Result};
pub use executor::{CommandLine, Executor, Strictness, SystemExecutor};
pub use hashes::{HashResolver, PypiHashResolver};
pub use install::{apply_locked, install, sync};
pub use lock::{verify_lock, LockChange, LockChangeKind, LockEngine, LockFile, PackageLock};
pub use session::{Lease, Lifetime, SessionKey, SessionManager, SessionState};
pub use spec::{AliasSpec, EnvironmentSpec, ProjectSpec};

/// Well-known filename for project declarations.
pub const PYPROJECT_FILENAME: &str = "pyproject.toml";

/// Well-known filename for lock files.
pub const PIPY_LOCK_FILENAME: &str = "pipy.lock.toml";

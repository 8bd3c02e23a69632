// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for pipy operations.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

/// Convenience Result type with pipy Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during pipy operations.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// pyproject.toml has no [tool.pipy] table
    #[error("{0:?} is not a pipy project")]
    #[diagnostic(
        code(pipy::not_a_project),
        help("Add a [tool.pipy] table with a project name, or run 'pipy init'")
    )]
    NotAPipyProject(PathBuf),

    /// No environments declared
    #[error("No environments found to lock")]
    #[diagnostic(
        code(pipy::missing_environments),
        help("Add [[tool.pipy.environments]] entries to pyproject.toml")
    )]
    MissingEnvironments,

    /// No interpreter versions declared
    #[error("No versions found to lock")]
    #[diagnostic(
        code(pipy::missing_versions),
        help("Add versions = [\"3.9\", ...] to [tool.pipy] in pyproject.toml")
    )]
    MissingVersions,

    /// Two environments share a name
    #[error("Environment '{0}' is declared more than once")]
    #[diagnostic(code(pipy::duplicate_environment))]
    DuplicateEnvironment(String),

    /// An include names an environment that was never declared
    #[error("Environment '{environment}' includes '{include}', which is not declared")]
    #[diagnostic(
        code(pipy::missing_include),
        help("Declare a [[tool.pipy.environments]] entry named '{include}' or remove the include")
    )]
    MissingInclude { environment: String, include: String },

    /// Alias not declared
    #[error("No alias named '{0}'")]
    #[diagnostic(
        code(pipy::unknown_alias),
        help("Add to pyproject.toml:\n[[tool.pipy.aliases]]\nname = \"{0}\"\ncommands = [...]")
    )]
    UnknownAlias(String),

    /// Failed to read file
    #[error("Failed to read file: {path:?}")]
    #[diagnostic(code(pipy::read_failed))]
    ReadFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to write file
    #[error("Failed to write file: {path:?}")]
    #[diagnostic(code(pipy::write_failed))]
    WriteFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Invalid TOML in pyproject.toml
    #[error("Invalid project file {path:?}: {error}")]
    #[diagnostic(
        code(pipy::invalid_toml),
        help("Check TOML syntax of the [tool.pipy] table")
    )]
    InvalidToml {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    /// Runtime configuration could not be assembled
    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(pipy::config))]
    Config(#[from] config::ConfigError),

    /// No lock file on disk
    #[error("No lock file found at {0:?}")]
    #[diagnostic(code(pipy::lock_not_found), help("Run 'pipy lock' to create one"))]
    LockNotFound(PathBuf),

    /// Lock file could not be parsed
    #[error("Invalid lock file {path:?}: {error}")]
    #[diagnostic(
        code(pipy::invalid_lock),
        help("Delete the lock file and run 'pipy lock' again")
    )]
    InvalidLock {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    /// Lock document could not be serialized
    #[error("Failed to serialize lock file: {0}")]
    #[diagnostic(code(pipy::serialize_lock))]
    SerializeLock(#[from] toml::ser::Error),

    /// Environment absent from lock document
    #[error("Environment '{0}' is not in the lock file")]
    #[diagnostic(
        code(pipy::lock_missing_environment),
        help("Add the '{0}' environment to [[tool.pipy.environments]] and re-run 'pipy lock'")
    )]
    LockMissingEnvironment(String),

    /// Version absent from lock document
    #[error("Environment '{environment}' has no lock for Python {version}")]
    #[diagnostic(
        code(pipy::lock_missing_version),
        help("Add \"{version}\" to versions in [tool.pipy] and re-run 'pipy lock'")
    )]
    LockMissingVersion { environment: String, version: String },

    /// Container runtime executable missing
    #[error("Could not find a usable '{0}' executable")]
    #[diagnostic(
        code(pipy::runtime_not_found),
        help("Install {0} or point PIPY_RUNTIME at a compatible container runtime")
    )]
    RuntimeNotFound(String),

    /// Process could not be started
    #[error("Failed to run '{command}'")]
    #[diagnostic(code(pipy::spawn_failed))]
    SpawnFailed {
        command: String,
        #[source]
        error: std::io::Error,
    },

    /// Process exited nonzero
    #[error("Command '{command}' exited with status {status}")]
    #[diagnostic(code(pipy::command_failed), help("{stderr}"))]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Process wrote to stderr under strict checking
    #[error("Command '{command}' reported errors")]
    #[diagnostic(code(pipy::command_stderr), help("{stderr}"))]
    CommandStderr { command: String, stderr: String },

    /// Installer output contained a requirement without an exact pin
    #[error("Cannot lock '{0}': installer did not report an exact version")]
    #[diagnostic(
        code(pipy::unpinnable_requirement),
        help("Only packages installed from an index can be locked")
    )]
    UnpinnableRequirement(String),

    /// Hash lookup failed
    #[error("Failed to fetch hashes for {package}=={version}: {reason}")]
    #[diagnostic(code(pipy::hash_lookup))]
    HashLookup {
        package: String,
        version: String,
        reason: String,
    },

    /// Session operation not valid in the current state
    #[error("Cannot {operation} session {session}: it is {state}")]
    #[diagnostic(code(pipy::invalid_transition))]
    InvalidTransition {
        session: String,
        operation: &'static str,
        state: SessionState,
    },

    /// HTTP transport error passthrough
    #[error(transparent)]
    #[diagnostic(code(pipy::http_error))]
    Http(#[from] reqwest::Error),

    /// IO error passthrough
    #[error(transparent)]
    #[diagnostic(code(pipy::io_error))]
    Io(#[from] std::io::Error),
}

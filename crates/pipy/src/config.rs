// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration shared by the session, lock and install components.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "PIPY";

/// Settings for the container runtime, the package index and lock output.
///
/// Every field has a default, so an empty configuration is valid.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Container runtime executable.
    pub runtime: String,

    /// Session image, `{version}` is replaced with the interpreter version.
    pub image: String,

    /// Mount point of the project directory inside a session.
    pub workdir: String,

    /// Host pip cache to mount into sessions.
    /// When unset, `pip cache dir` is queried on the host.
    pub cache_dir: Option<PathBuf>,

    /// Mount the host container socket into sessions.
    pub mount_docker_socket: bool,

    /// Shell started by `pipy open`.
    pub shell: String,

    /// Base URL of the package index JSON API.
    pub index_url: String,

    /// Number of interpreter versions locked concurrently.
    pub jobs: usize,

    /// File name of the lock document in the project root.
    pub lock_filename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: "python:{version}".to_string(),
            workdir: "/src".to_string(),
            cache_dir: None,
            mount_docker_socket: true,
            shell: "bash".to_string(),
            index_url: "https://pypi.org/pypi".to_string(),
            jobs: 1,
            lock_filename: crate::PIPY_LOCK_FILENAME.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the user config file and `PIPY_*` variables.
    pub fn load() -> crate::Result<Self> {
        let user_file = dirs::config_dir().map(|dir| dir.join("pipy").join("config.toml"));
        Self::load_from(user_file.as_deref())
    }

    /// Load configuration layering `file` (if it exists) under the environment.
    pub fn load_from(file: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(
                config::File::from(file)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        if config.jobs == 0 {
            config.jobs = 1;
        }
        Ok(config)
    }

    /// Image reference for the given interpreter version.
    pub fn image_for(&self, version: &str) -> String {
        self.image.replace("{version}", version)
    }

    /// Path of the lock document for a project rooted at `root`.
    pub fn lock_path(&self, root: &Path) -> PathBuf {
        root.join(&self.lock_filename)
    }
}

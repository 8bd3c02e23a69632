// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of isolated interpreter sessions.
//!
//! A session is a container bound to one `(project, interpreter version)`
//! pair. Its state is always read back from the container runtime, so what
//! [`SessionManager::state`] reports matches what exists on the host.
//!
//! ```text
//! Absent --ensure--> Running --suspend--> Paused
//!    ^                  |                   |
//!    +----teardown------+<-----ensure-------+
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::executor::{CommandLine, Executor, Strictness};
use crate::Config;

#[cfg(test)]
#[path = "./session_test.rs"]
mod session_test;

/// Identity of a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey {
    pub project: String,
    pub version: String,
}

impl SessionKey {
    pub fn new<P: Into<String>, V: Into<String>>(project: P, version: V) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
        }
    }

    /// Container name addressed by every runtime command for this key.
    pub fn container_name(&self) -> String {
        format!("pipy-{}-{}", self.version, self.project)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.container_name())
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Running,
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Running => f.write_str("running"),
            Self::Paused => f.write_str("paused"),
        }
    }
}

/// What happens to a session when its [`Lease`] is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Torn down after use.
    Transient,
    /// Paused after use, resumed by the next `ensure`.
    Suspend,
    /// Left running.
    Persistent,
}

/// Creates, pauses, resumes and removes sessions through the container runtime.
pub struct SessionManager {
    executor: Arc<dyn Executor>,
    config: Config,
    root: PathBuf,
    key_locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
    open: Mutex<BTreeSet<SessionKey>>,
    cache_dir: tokio::sync::OnceCell<PathBuf>,
}

impl SessionManager {
    /// Create a manager for sessions that mount the project at `root`.
    pub fn new(executor: Arc<dyn Executor>, config: Config, root: PathBuf) -> Self {
        Self {
            executor,
            config,
            root,
            key_locks: Mutex::new(HashMap::new()),
            open: Mutex::new(BTreeSet::new()),
            cache_dir: tokio::sync::OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fail early when the container runtime is not installed.
    pub fn check_runtime(&self) -> crate::Result<()> {
        if self.executor.is_available(&self.config.runtime) {
            Ok(())
        } else {
            Err(crate::Error::RuntimeNotFound(self.config.runtime.clone()))
        }
    }

    /// Read the current state of a session from the runtime.
    pub async fn state(&self, key: &SessionKey) -> crate::Result<SessionState> {
        let name = key.container_name();
        let inspect = self
            .runtime()
            .args(["inspect", "--format", "{{.State.Status}}"])
            .arg(&name);
        let output = self.executor.output(&inspect).await?;
        if !output.success() {
            return Ok(SessionState::Absent);
        }

        match output.stdout.trim() {
            "paused" => Ok(SessionState::Paused),
            "running" | "restarting" => Ok(SessionState::Running),
            status => {
                // exited, created or dead containers cannot be resumed
                tracing::debug!(session = %key, status, "removing stale session");
                self.remove(key, Strictness::BestEffort).await?;
                Ok(SessionState::Absent)
            }
        }
    }

    /// Make sure the session is running, creating or resuming it as needed.
    ///
    /// Returns the state the session was in beforehand.
    #[tracing::instrument(skip(self, key), fields(session = %key))]
    pub async fn ensure(&self, key: &SessionKey) -> crate::Result<SessionState> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let state = self.state(key).await?;
        match state {
            SessionState::Absent => {
                tracing::info!("Creating session {key}");
                self.create(key).await?;
            }
            SessionState::Paused => {
                tracing::info!("Resuming session {key}");
                let unpause = self.runtime().arg("unpause").arg(key.container_name());
                self.executor.collect(&unpause, Strictness::Strict).await?;
            }
            SessionState::Running => {
                tracing::debug!("Session already running");
            }
        }
        Ok(state)
    }

    /// Pause a running session without destroying it.
    #[tracing::instrument(skip(self, key), fields(session = %key))]
    pub async fn suspend(&self, key: &SessionKey) -> crate::Result<()> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let state = self.state(key).await?;
        if state != SessionState::Running {
            return Err(crate::Error::InvalidTransition {
                session: key.to_string(),
                operation: "suspend",
                state,
            });
        }

        let pause = self.runtime().arg("pause").arg(key.container_name());
        self.executor.collect(&pause, Strictness::Strict).await?;
        Ok(())
    }

    /// Stop and remove a session.
    ///
    /// Under [`Strictness::BestEffort`] a missing session is not an error.
    #[tracing::instrument(skip(self, key), fields(session = %key))]
    pub async fn teardown(&self, key: &SessionKey, strictness: Strictness) -> crate::Result<()> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let state = self.state(key).await;
        match (state, strictness) {
            (Ok(SessionState::Absent), Strictness::BestEffort) => {
                tracing::debug!("No session to tear down");
                Ok(())
            }
            (Ok(SessionState::Absent), Strictness::Strict) => {
                Err(crate::Error::InvalidTransition {
                    session: key.to_string(),
                    operation: "tear down",
                    state: SessionState::Absent,
                })
            }
            (Err(err), Strictness::BestEffort) => {
                tracing::warn!("Could not inspect session {key}: {err}");
                self.remove(key, strictness).await
            }
            (Err(err), Strictness::Strict) => Err(err),
            (Ok(_), _) => {
                tracing::info!("Removing session {key}");
                self.remove(key, strictness).await
            }
        }
    }

    /// Run a shell command inside a running session and return its stdout.
    pub async fn execute(
        &self,
        key: &SessionKey,
        command: &str,
        strictness: Strictness,
    ) -> crate::Result<String> {
        self.require_running(key, "execute in").await?;
        let exec = self
            .runtime()
            .arg("exec")
            .arg(key.container_name())
            .args(["sh", "-c", command]);
        self.executor.collect(&exec, strictness).await
    }

    /// Attach the terminal to `program` inside a running session.
    pub async fn attach(&self, key: &SessionKey, program: &str) -> crate::Result<i32> {
        self.require_running(key, "attach to").await?;
        let exec = self
            .runtime()
            .args(["exec", "--interactive", "--tty"])
            .arg(key.container_name())
            .arg(program);
        self.executor.interactive(&exec).await
    }

    /// Run a shell command in a running session attached to the terminal.
    pub async fn run(&self, key: &SessionKey, command: &str) -> crate::Result<i32> {
        self.require_running(key, "run in").await?;
        let exec = self
            .runtime()
            .args(["exec", "--interactive", "--tty"])
            .arg(key.container_name())
            .args(["sh", "-c", command]);
        self.executor.interactive(&exec).await
    }

    /// Ensure a session and hand out a lease that applies `lifetime` on release.
    pub async fn acquire(&self, key: SessionKey, lifetime: Lifetime) -> crate::Result<Lease<'_>> {
        if lifetime == Lifetime::Transient {
            self.open_sessions().insert(key.clone());
        }

        if let Err(err) = self.ensure(&key).await {
            if lifetime == Lifetime::Transient {
                // creation may have left a half-started container behind
                if let Err(cleanup) = self.teardown(&key, Strictness::BestEffort).await {
                    tracing::warn!("Failed to tear down session {key}: {cleanup}");
                }
                self.open_sessions().remove(&key);
            }
            return Err(err);
        }

        Ok(Lease {
            manager: self,
            key,
            lifetime,
            released: false,
        })
    }

    /// Tear down every transient session whose lease is still outstanding.
    ///
    /// Used when an operation is interrupted before it could release.
    pub async fn release_all(&self) {
        let keys: Vec<SessionKey> = std::mem::take(&mut *self.open_sessions())
            .into_iter()
            .collect();
        for key in keys {
            if let Err(err) = self.teardown(&key, Strictness::BestEffort).await {
                tracing::warn!("Failed to tear down session {key}: {err}");
            }
        }
    }

    /// Keys of transient sessions that have not been released.
    pub fn outstanding(&self) -> Vec<SessionKey> {
        self.open_sessions().iter().cloned().collect()
    }

    async fn require_running(&self, key: &SessionKey, operation: &'static str) -> crate::Result<()> {
        let state = self.state(key).await?;
        if state == SessionState::Running {
            Ok(())
        } else {
            Err(crate::Error::InvalidTransition {
                session: key.to_string(),
                operation,
                state,
            })
        }
    }

    async fn create(&self, key: &SessionKey) -> crate::Result<()> {
        let cache_dir = self.cache_dir().await?;
        let workdir = &self.config.workdir;

        let mut run = self
            .runtime()
            .arg("run")
            .arg("--name")
            .arg(key.container_name())
            .args(["--interactive", "--tty", "--detach", "--rm"])
            .arg("--workdir")
            .arg(workdir)
            .arg("--volume")
            .arg(format!("{}:{workdir}", self.root.display()))
            .arg("--volume")
            .arg(format!("{}:/root/.cache/pip", cache_dir.display()));
        if self.config.mount_docker_socket {
            run = run
                .arg("--volume")
                .arg("/var/run/docker.sock:/var/run/docker.sock");
        }
        let run = run
            .args(["--env", "PIP_DISABLE_PIP_VERSION_CHECK=1"])
            .args(["--env", "PIP_ROOT_USER_ACTION=ignore"])
            .arg(self.config.image_for(&key.version));

        self.executor.collect(&run, Strictness::Strict).await?;
        Ok(())
    }

    async fn remove(&self, key: &SessionKey, strictness: Strictness) -> crate::Result<()> {
        let rm = self
            .runtime()
            .args(["rm", "--force"])
            .arg(key.container_name());
        self.executor.collect(&rm, strictness).await?;
        Ok(())
    }

    async fn cache_dir(&self) -> crate::Result<PathBuf> {
        let dir = self
            .cache_dir
            .get_or_try_init(|| async {
                if let Some(dir) = &self.config.cache_dir {
                    return Ok::<_, crate::Error>(dir.clone());
                }
                let query = CommandLine::new("pip").args(["cache", "dir"]);
                let reported = self
                    .executor
                    .collect(&query, Strictness::BestEffort)
                    .await?;
                if !reported.is_empty() {
                    return Ok(PathBuf::from(reported));
                }
                let fallback = dirs::cache_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("pip");
                tracing::debug!("pip cache dir unavailable, using {}", fallback.display());
                Ok(fallback)
            })
            .await?;
        Ok(dir.clone())
    }

    fn runtime(&self) -> CommandLine {
        CommandLine::new(&self.config.runtime)
    }

    fn key_lock(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn open_sessions(&self) -> std::sync::MutexGuard<'_, BTreeSet<SessionKey>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A session acquired for a bounded unit of work.
///
/// Finish with [`Lease::release`] or [`Lease::release_with`]. A lease dropped
/// without release leaves transient sessions to [`SessionManager::release_all`].
pub struct Lease<'a> {
    manager: &'a SessionManager,
    key: SessionKey,
    lifetime: Lifetime,
    released: bool,
}

impl std::fmt::Debug for Lease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Lease<'_> {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Run a command in the leased session under strict checking.
    pub async fn execute(&self, command: &str) -> crate::Result<String> {
        self.manager
            .execute(&self.key, command, Strictness::Strict)
            .await
    }

    /// Attach the terminal to `program` in the leased session.
    pub async fn attach(&self, program: &str) -> crate::Result<i32> {
        self.manager.attach(&self.key, program).await
    }

    /// Run a shell command in the leased session attached to the terminal.
    pub async fn run(&self, command: &str) -> crate::Result<i32> {
        self.manager.run(&self.key, command).await
    }

    /// Apply the lifetime policy.
    pub async fn release(mut self) -> crate::Result<()> {
        self.released = true;
        match self.lifetime {
            Lifetime::Transient => {
                let result = self.manager.teardown(&self.key, Strictness::Strict).await;
                self.manager.open_sessions().remove(&self.key);
                result
            }
            Lifetime::Suspend => self.manager.suspend(&self.key).await,
            Lifetime::Persistent => Ok(()),
        }
    }

    /// Release, then return `outcome`.
    ///
    /// A failed outcome also tears down a persistent session. An error from
    /// the work takes precedence over an error from releasing.
    pub async fn release_with<T>(mut self, outcome: crate::Result<T>) -> crate::Result<T> {
        let key = self.key.clone();
        if outcome.is_err() && self.lifetime == Lifetime::Persistent {
            tracing::info!("Removing session {key} after a failed operation");
            self.lifetime = Lifetime::Transient;
        }
        let released = self.release().await;
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                tracing::warn!("Failed to release session {key}: {release_err}");
                Err(err)
            }
        }
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(session = %self.key, "session lease dropped without release");
        }
    }
}

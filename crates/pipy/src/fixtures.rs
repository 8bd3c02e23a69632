// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Test doubles for the container runtime and the package index.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::executor::{CommandLine, CommandOutput, Executor};
use crate::hashes::HashResolver;
use crate::session::{SessionManager, SessionState};
use crate::Config;

#[derive(Default)]
struct DockerState {
    containers: BTreeMap<String, (SessionState, String)>,
    commands: Vec<CommandLine>,
    freeze: HashMap<String, String>,
    fail_exec: Option<String>,
    fail_start: bool,
    creations: usize,
}

/// In-memory stand-in for `docker` that models container state.
///
/// `pip freeze` inside a container returns the output scripted for the
/// container's interpreter version.
#[derive(Clone, Default)]
pub struct FakeDocker {
    state: Arc<Mutex<DockerState>>,
    missing: bool,
    yielding: bool,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime that is not installed.
    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    /// Yield to the scheduler before every command so concurrent callers
    /// interleave.
    pub fn yielding(self) -> Self {
        Self {
            yielding: true,
            ..self
        }
    }

    /// Script the `pip freeze` output for an interpreter version.
    pub fn with_freeze(self, version: &str, output: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .freeze
            .insert(version.to_string(), output.to_string());
        self
    }

    /// Make any exec whose command contains `needle` fail.
    pub fn failing_exec(self, needle: &str) -> Self {
        self.state.lock().unwrap().fail_exec = Some(needle.to_string());
        self
    }

    /// Make `docker run` create the container but exit with an error.
    pub fn failing_start(self) -> Self {
        self.state.lock().unwrap().fail_start = true;
        self
    }

    /// Pretend a container already exists.
    pub fn with_container(self, name: &str, state: SessionState, version: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(name.to_string(), (state, version.to_string()));
        self
    }

    pub fn container(&self, name: &str) -> Option<SessionState> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|(state, _)| *state)
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn creations(&self) -> usize {
        self.state.lock().unwrap().creations
    }

    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Shell commands run through `docker exec ... sh -c`.
    pub fn exec_scripts(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|cmd| cmd.args.first().map(String::as_str) == Some("exec"))
            .filter_map(|cmd| cmd.args.last().cloned())
            .collect()
    }

    pub fn manager(&self) -> SessionManager {
        SessionManager::new(
            Arc::new(self.clone()),
            Config::default(),
            PathBuf::from("/work/demo"),
        )
    }

    fn handle(&self, command: &CommandLine) -> CommandOutput {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.clone());

        if command.program == "pip" {
            return ok("/home/user/.cache/pip\n");
        }

        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["inspect", "--format", _, name] => match state.containers.get(*name) {
                Some((SessionState::Paused, _)) => ok("paused\n"),
                Some(_) => ok("running\n"),
                None => fail(1, "Error: No such object"),
            },
            ["run", "--name", name, .., image] => {
                if state.containers.contains_key(*name) {
                    return fail(125, "Conflict. The container name is already in use");
                }
                let version = image.rsplit(':').next().unwrap_or_default().to_string();
                state
                    .containers
                    .insert(name.to_string(), (SessionState::Running, version));
                state.creations += 1;
                if state.fail_start {
                    return fail(125, "Error response from daemon: failed to start container");
                }
                ok("0123456789abcdef\n")
            }
            ["pause", name] => transition(&mut state, name, SessionState::Running, SessionState::Paused),
            ["unpause", name] => transition(&mut state, name, SessionState::Paused, SessionState::Running),
            ["rm", "--force", name] => match state.containers.remove(*name) {
                Some(_) => ok(&format!("{name}\n")),
                None => fail(1, "Error: No such container"),
            },
            ["exec", name, "sh", "-c", script] => {
                let version = match state.containers.get(*name) {
                    Some((SessionState::Running, version)) => version.clone(),
                    _ => return fail(1, "Error: container is not running"),
                };
                if let Some(needle) = &state.fail_exec {
                    if script.contains(needle.as_str()) {
                        return fail(1, "ERROR: No matching distribution found");
                    }
                }
                if script.contains("pip freeze") {
                    return ok(state.freeze.get(&version).map(String::as_str).unwrap_or(""));
                }
                ok("")
            }
            _ => fail(1, "unsupported command"),
        }
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        status: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn fail(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        status,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn transition(
    state: &mut DockerState,
    name: &str,
    from: SessionState,
    to: SessionState,
) -> CommandOutput {
    match state.containers.get_mut(name) {
        Some((current, _)) if *current == from => {
            *current = to;
            ok(&format!("{name}\n"))
        }
        Some(_) => fail(1, "Error: container is in the wrong state"),
        None => fail(1, "Error: No such container"),
    }
}

#[async_trait]
impl Executor for FakeDocker {
    async fn output(&self, command: &CommandLine) -> crate::Result<CommandOutput> {
        if self.yielding {
            tokio::task::yield_now().await;
        }
        Ok(self.handle(command))
    }

    async fn interactive(&self, command: &CommandLine) -> crate::Result<i32> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.clone());
        Ok(0)
    }

    fn is_available(&self, _program: &str) -> bool {
        !self.missing
    }
}

/// Hash resolver returning deterministic fake digests.
#[derive(Clone, Default)]
pub struct StaticHashes {
    calls: Arc<Mutex<Vec<(String, String, String)>>>,
    failing: Option<String>,
}

impl StaticHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail lookups for `package`.
    pub fn failing(package: &str) -> Self {
        Self {
            failing: Some(package.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn digest(package: &str, version: &str, python: &str) -> String {
        crate::hashes::sha512_hex(format!("{package}=={version} py{python}").as_bytes())
    }
}

#[async_trait]
impl HashResolver for StaticHashes {
    async fn hashes(
        &self,
        package: &str,
        version: &str,
        python: &str,
    ) -> crate::Result<Vec<String>> {
        self.calls.lock().unwrap().push((
            package.to_string(),
            version.to_string(),
            python.to_string(),
        ));
        if self.failing.as_deref() == Some(package) {
            return Err(crate::Error::HashLookup {
                package: package.to_string(),
                version: version.to_string(),
                reason: "index unavailable".to_string(),
            });
        }
        Ok(vec![Self::digest(package, version, python)])
    }
}

//! In-memory stand-ins for the container runtime, SQL endpoint, and health
//! probe. Every call is recorded so callers can assert what was (and was not)
//! issued.

use crate::backend::{BuildRequest, ContainerRuntime, ContainerSpec, PortMapping, VolumeMount};
use crate::health::HealthProbe;
use crate::sql::{SqlEndpoint, SqlError};
use crate::RuntimeError;
use pgforge_schema::{ContainerName, VolumeName};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

pub const MOCK_PSQL_VERSION: &str = "psql (PostgreSQL) 16.4 (Debian 16.4-1.pgdg120+2)";

#[derive(Debug, Clone)]
struct MockContainer {
    running: bool,
    volume: String,
}

#[derive(Debug, Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    volumes: BTreeSet<String>,
    images: Vec<(String, String)>,
    calls: Vec<String>,
    exec_failures: Vec<String>,
    failing_ops: HashSet<String>,
}

#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_spec(name: &str, volume: &str) -> ContainerSpec {
        ContainerSpec {
            name: ContainerName::new(name),
            image: "postgres-extensions:latest".to_owned(),
            env: vec![("POSTGRES_PASSWORD".to_owned(), "postgres".to_owned())],
            port: PortMapping {
                host: 5432,
                container: 5432,
            },
            volume: VolumeMount {
                volume: VolumeName::new(volume),
                target: "/var/lib/postgresql/data".to_owned(),
            },
        }
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MockState) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?;
        f(&mut state)
    }

    fn record(&self, call: String) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(call);
        }
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// Make any `exec` whose command line contains `needle` fail.
    pub fn fail_exec_matching(&self, needle: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.exec_failures.push(needle.to_owned());
        }
    }

    /// Make a named operation (`build`, `create`, `restart`) fail.
    pub fn fail_operation(&self, op: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_ops.insert(op.to_owned());
        }
    }

    /// Seed an existing container, as left behind by an earlier run.
    pub fn add_container(&self, name: &str, volume: &str, running: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.containers.insert(
                name.to_owned(),
                MockContainer {
                    running,
                    volume: volume.to_owned(),
                },
            );
            state.volumes.insert(volume.to_owned());
        }
    }

    /// `(tag, platform)` of every image built.
    pub fn built_images(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .map(|s| s.images.clone())
            .unwrap_or_default()
    }

    fn check_op(state: &MockState, op: &str) -> Result<(), RuntimeError> {
        if state.failing_ops.contains(op) {
            return Err(RuntimeError::ExecFailed(format!("mock {op} failure")));
        }
        Ok(())
    }
}

impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn build(
        &self,
        request: &BuildRequest<'_>,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<(), RuntimeError> {
        self.record(format!("build {} {}", request.tag, request.platform));
        let steps = request
            .script
            .lines()
            .filter(|l| !l.starts_with(' ') && !l.trim().is_empty())
            .count();
        self.with_state(|state| {
            Self::check_op(state, "build")?;
            state
                .images
                .push((request.tag.to_owned(), request.platform.to_owned()));
            Ok(())
        })?;
        for i in 1..=steps {
            on_output(&format!("#{i} mock step {i}/{steps} DONE"));
        }
        Ok(())
    }

    fn create_and_start(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        self.record(format!("create {}", spec.name));
        self.with_state(|state| {
            Self::check_op(state, "create")?;
            if state.containers.contains_key(spec.name.as_str()) {
                return Err(RuntimeError::AlreadyExists(spec.name.to_string()));
            }
            state.containers.insert(
                spec.name.to_string(),
                MockContainer {
                    running: true,
                    volume: spec.volume.volume.to_string(),
                },
            );
            state.volumes.insert(spec.volume.volume.to_string());
            Ok(())
        })
    }

    fn container_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        self.record(format!("exists {name}"));
        self.with_state(|state| Ok(state.containers.contains_key(name)))
    }

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove-container {name}"));
        self.with_state(|state| {
            state.containers.remove(name);
            Ok(())
        })
    }

    fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("restart {name}"));
        self.with_state(|state| {
            Self::check_op(state, "restart")?;
            let container = state
                .containers
                .get_mut(name)
                .ok_or_else(|| RuntimeError::NotRunning(name.to_owned()))?;
            container.running = true;
            Ok(())
        })
    }

    fn is_running(&self, name: &str) -> bool {
        self.record(format!("is-running {name}"));
        self.state
            .lock()
            .map(|s| s.containers.get(name).is_some_and(|c| c.running))
            .unwrap_or(false)
    }

    fn exec(&self, name: &str, command: &[String]) -> Result<String, RuntimeError> {
        let line = command.join(" ");
        self.record(format!("exec {name} {line}"));
        self.with_state(|state| {
            if !state.containers.get(name).is_some_and(|c| c.running) {
                return Err(RuntimeError::NotRunning(name.to_owned()));
            }
            if state.exec_failures.iter().any(|n| line.contains(n.as_str())) {
                return Err(RuntimeError::CommandFailed {
                    command: line.clone(),
                    stderr: "mock exec failure".to_owned(),
                });
            }
            if command.first().map(String::as_str) == Some("psql")
                && command.iter().any(|a| a == "--version")
            {
                return Ok(MOCK_PSQL_VERSION.to_owned());
            }
            Ok(String::new())
        })
    }

    fn inspect_volume_of(&self, name: &str) -> Option<VolumeName> {
        self.record(format!("inspect-volume {name}"));
        self.state
            .lock()
            .ok()
            .and_then(|s| s.containers.get(name).map(|c| VolumeName::new(&c.volume)))
    }

    fn volume_exists(&self, volume: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.volumes.contains(volume))
            .unwrap_or(false)
    }

    fn remove_volume(&self, volume: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove-volume {volume}"));
        self.with_state(|state| {
            state.volumes.remove(volume);
            Ok(())
        })
    }
}

/// What a [`ScriptedProbe`] answers on a given call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAnswer {
    Ready,
    NotReady,
    Error,
}

/// Health probe replaying a fixed script; once the script runs out the last
/// answer repeats.
pub struct ScriptedProbe {
    script: Vec<ProbeAnswer>,
    calls: Mutex<usize>,
}

impl ScriptedProbe {
    pub fn new(script: Vec<ProbeAnswer>) -> Self {
        Self {
            script,
            calls: Mutex::new(0),
        }
    }

    pub fn always_ready() -> Self {
        Self::new(vec![ProbeAnswer::Ready])
    }

    pub fn never_ready() -> Self {
        Self::new(vec![ProbeAnswer::NotReady])
    }

    /// Not ready for `n` calls, ready afterwards.
    pub fn ready_after(n: usize) -> Self {
        let mut script = vec![ProbeAnswer::NotReady; n];
        script.push(ProbeAnswer::Ready);
        Self::new(script)
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

impl HealthProbe for ScriptedProbe {
    fn is_ready(&self, container: &str) -> Result<bool, RuntimeError> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?;
        let answer = self
            .script
            .get(*calls)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(ProbeAnswer::NotReady);
        *calls += 1;
        match answer {
            ProbeAnswer::Ready => Ok(true),
            ProbeAnswer::NotReady => Ok(false),
            ProbeAnswer::Error => Err(RuntimeError::NotRunning(container.to_owned())),
        }
    }
}

/// SQL endpoint that records statements and fails on request.
#[derive(Default)]
pub struct RecordingSql {
    statements: Mutex<Vec<String>>,
    fail_at: Option<usize>,
    fail_matching: Option<String>,
    responses: Vec<(String, String)>,
}

impl RecordingSql {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th statement issued (1-based).
    #[must_use]
    pub fn failing_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Fail any statement containing `needle`.
    #[must_use]
    pub fn failing_matching(mut self, needle: &str) -> Self {
        self.fail_matching = Some(needle.to_owned());
        self
    }

    /// Answer statements containing `needle` with `output`.
    #[must_use]
    pub fn responding(mut self, needle: &str, output: &str) -> Self {
        self.responses.push((needle.to_owned(), output.to_owned()));
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl SqlEndpoint for RecordingSql {
    fn execute(
        &self,
        _container: &str,
        _database: &str,
        _user: &str,
        statement: &str,
    ) -> Result<String, SqlError> {
        let mut statements = self.statements.lock().map_err(|e| SqlError {
            statement: statement.to_owned(),
            message: format!("mutex poisoned: {e}"),
        })?;
        statements.push(statement.to_owned());
        let index = statements.len();

        let fails = self.fail_at == Some(index)
            || self
                .fail_matching
                .as_deref()
                .is_some_and(|n| statement.contains(n));
        if fails {
            return Err(SqlError {
                statement: statement.to_owned(),
                message: "ERROR:  mock failure".to_owned(),
            });
        }

        Ok(self
            .responses
            .iter()
            .find(|(needle, _)| statement.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }
}

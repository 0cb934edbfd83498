//! The lifecycle orchestrator: drives one container from teardown to a
//! verified, tested instance through the runtime, SQL and health-probe
//! collaborators.

use crate::concurrency::shutdown_requested;
use crate::config::{LifecycleConfig, DATA_DIR};
use crate::lifecycle::{Phase, PhaseTracker};
use crate::plan::{
    bootstrap_steps, parse_extension_rows, probe_steps, verify_statement, InstalledExtension,
    SqlStep,
};
use crate::poll::Poller;
use crate::shell::shell_quote;
use crate::CoreError;
use pgforge_runtime::{port_in_use, ContainerRuntime, HealthProbe, RemoveOutcome, SqlEndpoint};
use pgforge_schema::{extract_engine_config, Manifest};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Outcome of the verify phase.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    /// Raw query output as printed by the engine.
    pub text: String,
    pub installed: Vec<InstalledExtension>,
    /// Manifest extensions absent from `pg_extension`.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TestReport {
    pub passed: Vec<String>,
    /// Extensions without a functional probe.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleReport {
    pub phases: Vec<Phase>,
    pub engine_major: String,
    pub verify: VerifyReport,
    pub tests: TestReport,
    pub started_at: String,
    pub finished_at: String,
}

/// A run stopped at `phase`; nothing created before it is rolled back.
#[derive(Debug, Error)]
#[error("{phase} phase failed: {error}")]
pub struct LifecycleFailure {
    pub phase: Phase,
    #[source]
    pub error: CoreError,
    pub completed: Vec<Phase>,
}

pub struct Orchestrator<'a> {
    runtime: &'a dyn ContainerRuntime,
    sql: &'a dyn SqlEndpoint,
    probe: &'a dyn HealthProbe,
    manifest: &'a Manifest,
    config: LifecycleConfig,
    port_check: fn(u16) -> bool,
    interrupt_check: fn() -> bool,
    observer: Option<&'a dyn Fn(Phase)>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        sql: &'a dyn SqlEndpoint,
        probe: &'a dyn HealthProbe,
        manifest: &'a Manifest,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            runtime,
            sql,
            probe,
            manifest,
            config,
            port_check: port_in_use,
            interrupt_check: shutdown_requested,
            observer: None,
        }
    }

    /// Call `observer` each time a phase is entered.
    #[must_use]
    pub fn with_phase_observer(mut self, observer: &'a dyn Fn(Phase)) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the local "is this port bound" check.
    #[must_use]
    pub fn with_port_check(mut self, check: fn(u16) -> bool) -> Self {
        self.port_check = check;
        self
    }

    /// Replace the "stop at the next phase boundary" check.
    #[must_use]
    pub fn with_interrupt_check(mut self, check: fn() -> bool) -> Self {
        self.interrupt_check = check;
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    fn container(&self) -> &str {
        self.config.container_name.as_str()
    }

    /// Run every phase in order, stopping at the first failure.
    pub fn run_full_lifecycle(&self) -> Result<LifecycleReport, LifecycleFailure> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let mut tracker = PhaseTracker::new();

        self.enter(&mut tracker, Phase::Teardown, || {
            self.teardown(self.config.remove_volume_on_teardown)
                .map(drop)
        })?;
        self.enter(&mut tracker, Phase::Provisioned, || self.provision())?;
        self.enter(&mut tracker, Phase::WaitingReady, || self.wait_ready())?;
        let engine_major = self.enter(&mut tracker, Phase::Configured, || self.configure())?;
        self.enter(&mut tracker, Phase::Restarting, || {
            info!("restarting container {}", self.container());
            self.runtime.restart(self.container()).map_err(CoreError::from)
        })?;
        self.enter(&mut tracker, Phase::WaitingReadyAfterRestart, || {
            self.wait_ready()?;
            if !self.config.settle_delay.is_zero() {
                debug!("settling for {:?}", self.config.settle_delay);
                std::thread::sleep(self.config.settle_delay);
            }
            Ok(())
        })?;
        self.enter(&mut tracker, Phase::Bootstrapped, || self.bootstrap())?;
        let verify = self.enter(&mut tracker, Phase::Verified, || self.verify())?;
        let tests = self.enter(&mut tracker, Phase::Tested, || self.run_functional_tests())?;
        self.enter(&mut tracker, Phase::Done, || Ok(()))?;

        let mut phases = tracker.completed().to_vec();
        phases.push(tracker.current());
        info!("container {} is ready", self.container());
        Ok(LifecycleReport {
            phases,
            engine_major,
            verify,
            tests,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn enter<T>(
        &self,
        tracker: &mut PhaseTracker,
        phase: Phase,
        work: impl FnOnce() -> Result<T, CoreError>,
    ) -> Result<T, LifecycleFailure> {
        // The phase being left is completed even when this one is interrupted.
        let result = tracker.advance(phase).and_then(|()| {
            if (self.interrupt_check)() {
                return Err(CoreError::Interrupted(phase.to_string()));
            }
            debug!("entering phase {phase}");
            if let Some(observer) = self.observer {
                observer(phase);
            }
            work()
        });
        result.map_err(|error| {
            tracker.fail();
            LifecycleFailure {
                phase,
                error,
                completed: tracker.completed().to_vec(),
            }
        })
    }

    /// Remove the container (and optionally its volume). A missing
    /// container is fine.
    pub fn teardown(&self, remove_volume: bool) -> Result<RemoveOutcome, CoreError> {
        Ok(self.runtime.remove(self.container(), remove_volume)?)
    }

    fn provision(&self) -> Result<(), CoreError> {
        if (self.port_check)(self.config.port) {
            return Err(CoreError::PortConflict(self.config.port));
        }
        info!(
            "starting container {} from {} on port {}",
            self.container(),
            self.config.image,
            self.config.port
        );
        self.runtime
            .create_and_start(&self.config.container_spec())?;
        Ok(())
    }

    fn wait_ready(&self) -> Result<(), CoreError> {
        let poller = Poller::new(self.config.ready_attempts, self.config.ready_delay);
        info!("waiting for {} to accept connections", self.container());
        if poller.wait_until_ready(|| self.probe.is_ready(self.container())) {
            info!("{} is accepting connections", self.container());
            Ok(())
        } else {
            Err(CoreError::ReadinessTimeout {
                container: self.container().to_owned(),
                attempts: self.config.ready_attempts,
            })
        }
    }

    /// Link plugins and write engine settings. Returns the engine's major
    /// version.
    fn configure(&self) -> Result<String, CoreError> {
        let output = self
            .runtime
            .exec(self.container(), &["psql".to_owned(), "--version".to_owned()])?;
        let major = parse_major_version(&output)
            .ok_or_else(|| CoreError::VersionUnknown(output.trim().to_owned()))?;
        info!("engine major version {major}");

        for command in configure_commands(self.manifest, &major) {
            debug!("{}", command.join(" "));
            self.runtime.exec(self.container(), &command)?;
        }
        Ok(major)
    }

    fn bootstrap(&self) -> Result<(), CoreError> {
        let engine_config = extract_engine_config(self.manifest);
        let steps = bootstrap_steps(self.manifest, &engine_config);
        info!("running {} bootstrap statements", steps.len());
        for step in &steps {
            self.execute(step, &step.description)?;
        }
        Ok(())
    }

    fn execute(&self, step: &SqlStep, description: &str) -> Result<String, CoreError> {
        debug!("{}", step.sql);
        self.sql
            .execute(
                self.container(),
                &self.config.database,
                &self.config.user,
                &step.sql,
            )
            .map_err(|source| CoreError::Sql {
                description: description.to_owned(),
                source,
            })
    }

    fn require_running(&self) -> Result<(), CoreError> {
        if self.runtime.is_running(self.container()) {
            Ok(())
        } else {
            Err(CoreError::NotRunning(self.container().to_owned()))
        }
    }

    /// List the manifest's extensions as installed in the running instance.
    pub fn verify(&self) -> Result<VerifyReport, CoreError> {
        self.require_running()?;
        let step = SqlStep {
            sql: verify_statement(self.manifest),
            description: "list installed extensions".to_owned(),
        };
        let text = self.execute(&step, &step.description)?;
        let installed = parse_extension_rows(&text);
        let missing: Vec<String> = self
            .manifest
            .extensions
            .sql_names()
            .into_iter()
            .filter(|name| !installed.iter().any(|row| row.name == *name))
            .collect();

        for row in &installed {
            info!("{} {}", row.name, row.version);
        }
        if !missing.is_empty() {
            if self.config.strict_verify {
                return Err(CoreError::VerificationFailed(missing));
            }
            warn!("extensions not installed: {}", missing.join(", "));
        }
        Ok(VerifyReport {
            text,
            installed,
            missing,
        })
    }

    /// Run each extension's functional probe in manifest order.
    pub fn run_functional_tests(&self) -> Result<TestReport, CoreError> {
        self.require_running()?;
        let mut report = TestReport::default();
        for ext in &self.manifest.extensions {
            let Some(kind) = ext.settings.probe else {
                report.skipped.push(ext.name.to_string());
                continue;
            };
            info!("testing {}", ext.name);
            for step in probe_steps(kind) {
                self.execute(&step, &format!("{} probe: {}", ext.name, step.description))?;
            }
            report.passed.push(ext.name.to_string());
        }
        Ok(report)
    }
}

/// Major version from `psql --version` output: the first run of digits
/// followed by a dot.
pub fn parse_major_version(output: &str) -> Option<String> {
    let bytes = output.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if bytes.get(i) == Some(&b'.') {
                return Some(output[start..i].to_owned());
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Shell commands run inside the container during the configure phase.
///
/// Each is safe to repeat: symlinks are forced and configuration lines are
/// appended only when not already present.
pub fn configure_commands(manifest: &Manifest, major: &str) -> Vec<Vec<String>> {
    let lib_dir = format!("/usr/lib/postgresql/{major}/lib");
    let conf = shell_quote(&format!("{DATA_DIR}/postgresql.conf"));
    let sh = |script: String| vec!["sh".to_owned(), "-c".to_owned(), script];

    let mut commands = Vec::new();
    for ext in &manifest.extensions {
        for plugin in &ext.settings.plugins {
            let target = shell_quote(&format!("{lib_dir}/{plugin}.so"));
            let link = shell_quote(&format!("{lib_dir}/plugins/{plugin}.so"));
            commands.push(sh(format!(
                "mkdir -p {} && ln -sf {target} {link}",
                shell_quote(&format!("{lib_dir}/plugins"))
            )));
        }
    }

    let engine_config = extract_engine_config(manifest);
    for line in [engine_config.preload_line(), engine_config.search_path_line()]
        .into_iter()
        .flatten()
    {
        commands.push(sh(append_once(&line, &conf)));
    }
    commands
}

/// Shell snippet appending `line` to the already-quoted `conf` path unless
/// an identical line is present.
fn append_once(line: &str, conf: &str) -> String {
    let line = shell_quote(line);
    format!("grep -qxF {line} {conf} || printf '%s\\n' {line} >> {conf}")
}

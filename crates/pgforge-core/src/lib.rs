//! Core of pgforge: build-script generation and the container lifecycle.
//!
//! This crate turns a parsed manifest into a reproducible build script and
//! drives a PostgreSQL container through its one-way lifecycle (teardown,
//! provisioning, readiness polling, configuration, restart, bootstrap,
//! verification and functional tests) on top of the collaborator traits
//! from `pgforge-runtime`.

pub mod concurrency;
pub mod config;
pub mod generate;
pub mod lifecycle;
pub mod orchestrator;
pub mod plan;
pub mod poll;
mod shell;

pub use concurrency::{install_signal_handler, shutdown_requested};
pub use config::LifecycleConfig;
pub use generate::{generate, generate_with_options, BuildScript, GenerateOptions, GenerationError};
pub use lifecycle::{validate_transition, Phase, PhaseTracker};
pub use orchestrator::{
    parse_major_version, LifecycleFailure, LifecycleReport, Orchestrator, TestReport,
    VerifyReport,
};
pub use plan::{InstalledExtension, SqlStep};
pub use poll::Poller;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] pgforge_schema::ManifestError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("runtime error: {0}")]
    Runtime(#[from] pgforge_runtime::RuntimeError),
    #[error("{description}: {source}")]
    Sql {
        description: String,
        #[source]
        source: pgforge_runtime::SqlError,
    },
    #[error("port {0} is already in use on this host; stop whatever holds it or pick another port")]
    PortConflict(u16),
    #[error("container '{container}' was not ready after {attempts} attempts")]
    ReadinessTimeout { container: String, attempts: u32 },
    #[error("cannot determine engine version from '{0}'")]
    VersionUnknown(String),
    #[error("container '{0}' is not running")]
    NotRunning(String),
    #[error("extensions not installed: {}", .0.join(", "))]
    VerificationFailed(Vec<String>),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("interrupted before {0}")]
    Interrupted(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

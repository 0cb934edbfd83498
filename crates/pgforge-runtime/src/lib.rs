//! Container runtime and database collaborators for pgforge.
//!
//! This crate implements the boundary to the outside world: the pluggable
//! `ContainerRuntime` trait with a Docker-CLI backend (also driving Podman)
//! and a scripted mock, the `SqlEndpoint` and `HealthProbe` adapters that run
//! `psql`/`pg_isready` inside the container, host platform detection, local
//! port checks, and prerequisite checking.

pub mod backend;
pub mod docker;
pub mod health;
pub mod mock;
pub mod prereq;
pub mod sql;

pub use backend::{
    select_runtime, BuildRequest, ContainerRuntime, ContainerSpec, PortMapping, RemoveOutcome,
    VolumeMount,
};
pub use docker::{host_platform, DockerRuntime};
pub use health::{HealthProbe, PgIsReady};
pub use prereq::{check_docker_prereqs, format_missing, port_in_use, MissingPrereq};
pub use sql::{PsqlEndpoint, SqlEndpoint, SqlError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("container '{0}' is not running")]
    NotRunning(String),
    #[error("container '{0}' already exists")]
    AlreadyExists(String),
    #[error("unsupported host architecture: {0}")]
    UnsupportedArchitecture(String),
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
}

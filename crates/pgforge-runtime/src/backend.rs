use crate::RuntimeError;
use pgforge_schema::{ContainerName, VolumeName};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeMount {
    pub volume: VolumeName,
    pub target: String,
}

/// Everything needed to create and start one detached container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: ContainerName,
    pub image: String,
    pub env: Vec<(String, String)>,
    pub port: PortMapping,
    pub volume: VolumeMount,
}

/// Image build input. `script` is the full build-script text.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub script: &'a str,
    pub platform: &'a str,
    pub tag: &'a str,
    pub context: &'a Path,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub container_removed: bool,
    pub volume_removed: Option<VolumeName>,
}

pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Build an image, passing every line of build output to `on_output`
    /// as soon as it is produced.
    fn build(
        &self,
        request: &BuildRequest<'_>,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<(), RuntimeError>;

    fn create_and_start(&self, spec: &ContainerSpec) -> Result<(), RuntimeError>;

    fn container_exists(&self, name: &str) -> Result<bool, RuntimeError>;

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;

    fn restart(&self, name: &str) -> Result<(), RuntimeError>;

    fn is_running(&self, name: &str) -> bool;

    /// Run `command` inside the container and return its stdout.
    /// A non-zero exit status is an error carrying stderr.
    fn exec(&self, name: &str, command: &[String]) -> Result<String, RuntimeError>;

    fn inspect_volume_of(&self, name: &str) -> Option<VolumeName>;

    fn volume_exists(&self, volume: &str) -> bool;

    fn remove_volume(&self, volume: &str) -> Result<(), RuntimeError>;

    /// Best-effort removal of a container and, optionally, its data volume.
    ///
    /// A missing container is not an error. Removal failures are logged and
    /// swallowed; only a failing existence check is reported.
    fn remove(&self, name: &str, also_remove_volume: bool) -> Result<RemoveOutcome, RuntimeError> {
        let mut outcome = RemoveOutcome::default();
        if !self.container_exists(name)? {
            info!("container {name} does not exist, nothing to remove");
            return Ok(outcome);
        }

        // The volume has to be looked up before the container is gone.
        let volume = if also_remove_volume {
            self.inspect_volume_of(name)
        } else {
            None
        };

        info!("removing container {name}");
        match self.remove_container(name) {
            Ok(()) => outcome.container_removed = true,
            Err(e) => warn!("failed to remove container {name}: {e}"),
        }

        if let Some(volume) = volume {
            if self.volume_exists(&volume) {
                info!("removing volume {volume}");
                match self.remove_volume(&volume) {
                    Ok(()) => outcome.volume_removed = Some(volume),
                    Err(e) => warn!("failed to remove volume {volume}: {e}"),
                }
            } else {
                info!("volume {volume} does not exist, nothing to remove");
            }
        }

        Ok(outcome)
    }
}

pub fn select_runtime(name: &str) -> Result<Box<dyn ContainerRuntime>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerRuntime::new())),
        "podman" => Ok(Box::new(crate::docker::DockerRuntime::with_binary("podman"))),
        "mock" => Ok(Box::new(crate::mock::MockRuntime::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;

    #[test]
    fn select_valid_runtimes() {
        assert!(select_runtime("docker").is_ok());
        assert!(select_runtime("podman").is_ok());
        assert!(select_runtime("mock").is_ok());
    }

    #[test]
    fn select_invalid_runtime_fails() {
        assert!(select_runtime("nonexistent").is_err());
    }

    #[test]
    fn remove_missing_container_is_not_an_error() {
        let runtime = MockRuntime::new();
        let outcome = runtime.remove("ghost", true).unwrap();
        assert_eq!(outcome, RemoveOutcome::default());
    }

    #[test]
    fn remove_with_volume_drops_both() {
        let runtime = MockRuntime::new();
        runtime.create_and_start(&MockRuntime::sample_spec("pg", "pgdata")).unwrap();

        let outcome = runtime.remove("pg", true).unwrap();
        assert!(outcome.container_removed);
        assert_eq!(outcome.volume_removed.as_deref(), Some("pgdata"));
        assert!(!runtime.volume_exists("pgdata"));
    }

    #[test]
    fn remove_without_volume_keeps_data() {
        let runtime = MockRuntime::new();
        runtime.create_and_start(&MockRuntime::sample_spec("pg", "pgdata")).unwrap();

        let outcome = runtime.remove("pg", false).unwrap();
        assert!(outcome.container_removed);
        assert!(outcome.volume_removed.is_none());
        assert!(runtime.volume_exists("pgdata"));
    }
}

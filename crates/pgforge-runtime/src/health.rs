use crate::backend::ContainerRuntime;
use crate::RuntimeError;

/// Readiness check backed by the engine's own facility.
///
/// `Ok(false)` means the engine answered but is not accepting connections
/// yet; `Err` means the check itself could not be carried out.
pub trait HealthProbe {
    fn is_ready(&self, container: &str) -> Result<bool, RuntimeError>;
}

/// Runs `pg_isready` inside the container.
pub struct PgIsReady<'a> {
    runtime: &'a dyn ContainerRuntime,
    user: String,
}

impl<'a> PgIsReady<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, user: impl Into<String>) -> Self {
        Self {
            runtime,
            user: user.into(),
        }
    }
}

impl HealthProbe for PgIsReady<'_> {
    fn is_ready(&self, container: &str) -> Result<bool, RuntimeError> {
        let command = vec!["pg_isready".to_owned(), "-U".to_owned(), self.user.clone()];
        match self.runtime.exec(container, &command) {
            Ok(_) => Ok(true),
            Err(RuntimeError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;

    #[test]
    fn ready_when_container_runs() {
        let runtime = MockRuntime::new();
        runtime
            .create_and_start(&MockRuntime::sample_spec("pg", "pgdata"))
            .unwrap();
        let probe = PgIsReady::new(&runtime, "postgres");
        assert!(probe.is_ready("pg").unwrap());
        assert!(runtime
            .calls()
            .iter()
            .any(|c| c == "exec pg pg_isready -U postgres"));
    }

    #[test]
    fn not_ready_when_command_fails() {
        let runtime = MockRuntime::new();
        runtime
            .create_and_start(&MockRuntime::sample_spec("pg", "pgdata"))
            .unwrap();
        runtime.fail_exec_matching("pg_isready");
        let probe = PgIsReady::new(&runtime, "postgres");
        assert!(!probe.is_ready("pg").unwrap());
    }

    #[test]
    fn missing_container_is_an_error() {
        let runtime = MockRuntime::new();
        let probe = PgIsReady::new(&runtime, "postgres");
        assert!(probe.is_ready("ghost").is_err());
    }
}

use crate::CoreError;
use pgforge_runtime::{ContainerSpec, PortMapping, VolumeMount};
use pgforge_schema::{ContainerName, VolumeName};
use serde::Serialize;
use std::time::Duration;

/// Port the engine listens on inside the container.
pub const ENGINE_PORT: u16 = 5432;
/// Data directory of the official PostgreSQL images.
pub const DATA_DIR: &str = "/var/lib/postgresql/data";

/// Everything one lifecycle run needs to know, resolved once up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleConfig {
    pub container_name: ContainerName,
    pub image: String,
    pub port: u16,
    pub volume: VolumeName,
    #[serde(skip_serializing)]
    pub password: String,
    pub user: String,
    pub database: String,
    pub remove_volume_on_teardown: bool,
    pub ready_attempts: u32,
    pub ready_delay: Duration,
    /// Pause after the post-restart readiness check, before bootstrap.
    pub settle_delay: Duration,
    /// Fail verification when a manifest extension is not installed.
    pub strict_verify: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            container_name: ContainerName::new("postgres-extensions"),
            image: "postgres-extensions:latest".to_owned(),
            port: ENGINE_PORT,
            volume: VolumeName::new("postgres-extensions-data"),
            password: "postgres".to_owned(),
            user: "postgres".to_owned(),
            database: "postgres".to_owned(),
            remove_volume_on_teardown: false,
            ready_attempts: 30,
            ready_delay: Duration::from_secs(2),
            settle_delay: Duration::from_secs(2),
            strict_verify: false,
        }
    }
}

impl LifecycleConfig {
    /// Defaults overridden by `POSTGRES_PASSWORD`, `POSTGRES_PORT` and
    /// `POSTGRES_VOLUME` as reported by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let mut config = Self::default();
        if let Some(password) = lookup("POSTGRES_PASSWORD") {
            config.password = password;
        }
        if let Some(port) = lookup("POSTGRES_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| CoreError::Config(format!("POSTGRES_PORT is not a valid port: '{port}'")))?;
        }
        if let Some(volume) = lookup("POSTGRES_VOLUME") {
            if volume.trim().is_empty() {
                return Err(CoreError::Config("POSTGRES_VOLUME must not be empty".to_owned()));
            }
            config.volume = VolumeName::new(volume.trim());
        }
        Ok(config)
    }

    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            name: self.container_name.clone(),
            image: self.image.clone(),
            env: vec![("POSTGRES_PASSWORD".to_owned(), self.password.clone())],
            port: PortMapping {
                host: self.port,
                container: ENGINE_PORT,
            },
            volume: VolumeMount {
                volume: self.volume.clone(),
                target: DATA_DIR.to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = LifecycleConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LifecycleConfig::default());
        assert_eq!(config.container_name, "postgres-extensions".to_owned());
        assert_eq!(config.port, 5432);
        assert_eq!(config.ready_attempts, 30);
    }

    #[test]
    fn environment_overrides() {
        let config = LifecycleConfig::from_lookup(lookup(&[
            ("POSTGRES_PASSWORD", "s3cret"),
            ("POSTGRES_PORT", "15432"),
            ("POSTGRES_VOLUME", "pgdata"),
        ]))
        .unwrap();
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.port, 15432);
        assert_eq!(config.volume, "pgdata".to_owned());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = LifecycleConfig::from_lookup(lookup(&[("POSTGRES_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(LifecycleConfig::from_lookup(lookup(&[("POSTGRES_PORT", "70000")])).is_err());
    }

    #[test]
    fn container_spec_maps_port_volume_and_password() {
        let config = LifecycleConfig {
            port: 6543,
            password: "pw".to_owned(),
            ..LifecycleConfig::default()
        };
        let spec = config.container_spec();
        assert_eq!(spec.port.host, 6543);
        assert_eq!(spec.port.container, 5432);
        assert_eq!(spec.volume.target, "/var/lib/postgresql/data");
        assert_eq!(
            spec.env,
            vec![("POSTGRES_PASSWORD".to_owned(), "pw".to_owned())]
        );
    }

    #[test]
    fn password_is_not_serialized() {
        let json = serde_json::to_string(&LifecycleConfig::default()).unwrap();
        assert!(!json.contains("password"));
    }
}

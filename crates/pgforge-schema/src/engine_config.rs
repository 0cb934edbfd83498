use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};

/// Schemas the engine keeps on the search path after the manifest's own.
pub const DEFAULT_SEARCH_PATH: &[&str] = &["\"$user\"", "public"];

/// Settings appended to the engine's configuration file.
///
/// Values are concatenated in manifest order and never deduplicated: the
/// engine reads them exactly as they appear in `postgresql.conf`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub shared_preload_libraries: Vec<String>,
    pub search_path: Vec<String>,
}

pub fn extract_engine_config(manifest: &Manifest) -> EngineConfig {
    let mut config = EngineConfig::default();
    for ext in &manifest.extensions {
        config
            .shared_preload_libraries
            .extend(ext.settings.shared_preload_libraries.iter().cloned());
        config
            .search_path
            .extend(ext.settings.search_path.iter().cloned());
    }
    config
}

impl EngineConfig {
    /// Full search path: manifest schemas first, then the engine defaults.
    pub fn effective_search_path(&self) -> Vec<String> {
        self.search_path
            .iter()
            .cloned()
            .chain(DEFAULT_SEARCH_PATH.iter().map(|s| (*s).to_owned()))
            .collect()
    }

    /// `shared_preload_libraries = '...'`, or `None` when nothing is preloaded.
    pub fn preload_line(&self) -> Option<String> {
        if self.shared_preload_libraries.is_empty() {
            return None;
        }
        Some(format!(
            "shared_preload_libraries = '{}'",
            self.shared_preload_libraries.join(",")
        ))
    }

    /// `search_path = '...'`, or `None` when the manifest adds no schemas.
    pub fn search_path_line(&self) -> Option<String> {
        if self.search_path.is_empty() {
            return None;
        }
        Some(format!(
            "search_path = '{}'",
            self.effective_search_path().join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest_str;

    const INPUT: &str = r#"
manifest_version = 1
base_image = "postgres:16"
engine_version = "16"

[extensions.age]
type = "source"
family = "age"
shared_preload_libraries = ["age"]
search_path = ["ag_catalog"]
repository = { type = "git", url = "https://github.com/apache/age.git", branch = "PG16" }
build = { directory = "/tmp/age" }

[extensions.timescaledb]
type = "source"
family = "timescaledb"
shared_preload_libraries = ["timescaledb"]
repository = { type = "git", url = "https://github.com/timescale/timescaledb.git" }
build = { directory = "/tmp/timescaledb" }

[extensions.vectors]
type = "package"
name = "vectors-pg16"
shared_preload_libraries = ["vectors", "age"]
search_path = ["vectors"]
repository = { type = "github", owner = "tensorchord", repo = "pgvecto.rs" }
architectures = { amd64 = "amd64", arm64 = "arm64" }
"#;

    #[test]
    fn concatenates_in_manifest_order() {
        let manifest = parse_manifest_str(INPUT).unwrap();
        let config = extract_engine_config(&manifest);
        assert_eq!(
            config.shared_preload_libraries,
            vec!["age", "timescaledb", "vectors", "age"]
        );
        assert_eq!(config.search_path, vec!["ag_catalog", "vectors"]);
    }

    #[test]
    fn renders_config_lines() {
        let manifest = parse_manifest_str(INPUT).unwrap();
        let config = extract_engine_config(&manifest);
        assert_eq!(
            config.preload_line().unwrap(),
            "shared_preload_libraries = 'age,timescaledb,vectors,age'"
        );
        assert_eq!(
            config.search_path_line().unwrap(),
            "search_path = 'ag_catalog, vectors, \"$user\", public'"
        );
    }

    #[test]
    fn empty_config_renders_nothing() {
        let config = EngineConfig::default();
        assert!(config.preload_line().is_none());
        assert!(config.search_path_line().is_none());
    }
}

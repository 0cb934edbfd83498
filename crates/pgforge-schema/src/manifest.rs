use crate::extension::{ExtensionKind, ExtensionSettings, ExtensionSpec, Extensions, Repository};
use crate::normalize::normalize_string_list;
use crate::types::ExtensionName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const SUPPORTED_MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("field must not be empty: {0}")]
    EmptyField(String),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("invalid extension '{name}': {reason}")]
    InvalidExtension { name: String, reason: String },
}

/// Validated, immutable description of the image to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub manifest_version: u32,
    pub base_image: String,
    pub engine_version: String,
    pub dependencies: Dependencies,
    pub extensions: Extensions,
}

/// Package names installed through the base image's package manager.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Dependencies {
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub runtime: Vec<String>,
}

impl Dependencies {
    /// Build and runtime packages as one sorted, deduplicated list.
    pub fn merged(&self) -> Vec<String> {
        let all: Vec<String> = self.build.iter().chain(&self.runtime).cloned().collect();
        normalize_string_list(&all)
    }

    pub fn has_runtime(&self, package: &str) -> bool {
        self.runtime.iter().any(|p| p.trim() == package)
    }
}

// Every top-level key is optional here so absence can be reported by name
// instead of surfacing as a serde message.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    manifest_version: Option<u32>,
    base_image: Option<String>,
    engine_version: Option<String>,
    #[serde(default)]
    dependencies: Dependencies,
    extensions: Option<toml::Table>,
}

const SETTINGS_KEYS: &[&str] = &[
    "shared_preload_libraries",
    "search_path",
    "sql_name",
    "recreate",
    "load",
    "plugins",
    "probe",
];

pub fn parse_manifest_str(input: &str) -> Result<Manifest, ManifestError> {
    let raw: RawManifest = toml::from_str(input)?;

    let manifest_version = raw
        .manifest_version
        .ok_or_else(|| ManifestError::MissingField("manifest_version".to_owned()))?;
    let base_image = raw
        .base_image
        .ok_or_else(|| ManifestError::MissingField("base_image".to_owned()))?;
    let engine_version = raw
        .engine_version
        .ok_or_else(|| ManifestError::MissingField("engine_version".to_owned()))?;
    let table = raw
        .extensions
        .ok_or_else(|| ManifestError::MissingField("extensions".to_owned()))?;

    if manifest_version != SUPPORTED_MANIFEST_VERSION {
        return Err(ManifestError::UnsupportedVersion(manifest_version));
    }

    let base_image = base_image.trim().to_owned();
    if base_image.is_empty() {
        return Err(ManifestError::EmptyField("base_image".to_owned()));
    }
    let engine_version = engine_version.trim().to_owned();
    if engine_version.is_empty() {
        return Err(ManifestError::EmptyField("engine_version".to_owned()));
    }

    let mut extensions = Vec::with_capacity(table.len());
    for (name, value) in table {
        extensions.push(parse_extension(&name, value)?);
    }

    Ok(Manifest {
        manifest_version,
        base_image,
        engine_version,
        dependencies: raw.dependencies,
        extensions: Extensions::new(extensions),
    })
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

fn invalid(name: &str, reason: impl Into<String>) -> ManifestError {
    ManifestError::InvalidExtension {
        name: name.to_owned(),
        reason: reason.into(),
    }
}

/// Extension keys end up in build-script comments and shell messages, so
/// they are restricted to `[a-zA-Z0-9_-]`.
fn validate_extension_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() || name.len() > 64 {
        return Err(invalid(name, "extension name must be 1-64 characters"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(invalid(name, "extension name must match [a-zA-Z0-9_-]"));
    }
    Ok(())
}

fn parse_extension(name: &str, value: toml::Value) -> Result<ExtensionSpec, ManifestError> {
    validate_extension_name(name)?;
    let toml::Value::Table(mut table) = value else {
        return Err(invalid(name, "expected a table"));
    };

    let tag = match table.remove("type") {
        Some(toml::Value::String(s)) => s,
        Some(_) => return Err(invalid(name, "'type' must be a string")),
        None => return Err(ManifestError::MissingField(format!("extensions.{name}.type"))),
    };

    let mut settings_table = toml::Table::new();
    for key in SETTINGS_KEYS {
        if let Some(v) = table.remove(*key) {
            settings_table.insert((*key).to_owned(), v);
        }
    }
    let settings: ExtensionSettings = toml::Value::Table(settings_table)
        .try_into()
        .map_err(|e: toml::de::Error| invalid(name, e.message()))?;

    let kind = match tag.as_str() {
        "package" => {
            let spec: crate::extension::PackageSpec = toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| invalid(name, e.message()))?;
            if !matches!(spec.repository, Repository::Github { .. }) {
                return Err(invalid(
                    name,
                    "package extensions require a 'github' repository",
                ));
            }
            if spec.name.trim().is_empty() {
                return Err(invalid(name, "package name must not be empty"));
            }
            ExtensionKind::Package(spec)
        }
        "source" => {
            let spec: crate::extension::SourceSpec = toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| invalid(name, e.message()))?;
            if !matches!(spec.repository, Repository::Git { .. }) {
                return Err(invalid(name, "source extensions require a 'git' repository"));
            }
            if spec.build.directory.trim().is_empty() {
                return Err(invalid(name, "build.directory must not be empty"));
            }
            ExtensionKind::Source(spec)
        }
        _ => ExtensionKind::Unsupported(tag),
    };

    Ok(ExtensionSpec {
        name: ExtensionName::new(name),
        kind,
        settings,
    })
}

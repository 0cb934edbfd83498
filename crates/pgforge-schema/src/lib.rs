//! Manifest parsing and validation for pgforge.
//!
//! This crate defines the schema layer: the TOML manifest describing which
//! PostgreSQL extensions to bake into an image and how (`Manifest`,
//! `ExtensionSpec`), the engine settings derived from it (`EngineConfig`),
//! and the string newtypes shared by the other crates.

pub mod engine_config;
pub mod extension;
pub mod manifest;
pub mod normalize;
pub mod types;

pub use engine_config::{extract_engine_config, EngineConfig, DEFAULT_SEARCH_PATH};
pub use extension::{
    BuildSection, ExtensionFamily, ExtensionKind, ExtensionSettings, ExtensionSpec, Extensions,
    PackageSpec, ProbeKind, Repository, SourceSpec,
};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, Dependencies, Manifest, ManifestError,
    SUPPORTED_MANIFEST_VERSION,
};
pub use normalize::normalize_string_list;
pub use types::{ContainerName, ExtensionName, VolumeName};

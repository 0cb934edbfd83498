use crate::types::ExtensionName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One entry of the manifest's `extensions` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSpec {
    pub name: ExtensionName,
    pub kind: ExtensionKind,
    pub settings: ExtensionSettings,
}

impl ExtensionSpec {
    /// Name used in `CREATE EXTENSION` and friends.
    pub fn sql_name(&self) -> &str {
        self.settings
            .sql_name
            .as_deref()
            .unwrap_or(self.name.as_str())
    }
}

/// How the extension gets into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionKind {
    /// Prebuilt release asset fetched per target architecture.
    Package(PackageSpec),
    /// Cloned and compiled inside the image.
    Source(SourceSpec),
    /// A `type` this version does not know how to install.
    Unsupported(String),
}

impl ExtensionKind {
    pub fn tag(&self) -> &str {
        match self {
            Self::Package(_) => "package",
            Self::Source(_) => "source",
            Self::Unsupported(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    /// Base name of the release asset, e.g. `vectors-pg16`.
    pub name: String,
    pub repository: Repository,
    /// Target architecture → substring identifying that architecture's asset.
    pub architectures: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    pub family: ExtensionFamily,
    pub repository: Repository,
    pub build: BuildSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Clone target and build root.
    pub directory: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Repository {
    Github {
        owner: String,
        repo: String,
    },
    Git {
        url: String,
        #[serde(default)]
        depth: Option<u32>,
        #[serde(default)]
        branch: Option<String>,
    },
}

/// Build recipe selector for source extensions.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionFamily {
    Age,
    Timescaledb,
    Pgvector,
    /// Plain PGXS `make install`.
    Pgxs,
}

impl fmt::Display for ExtensionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Age => "age",
            Self::Timescaledb => "timescaledb",
            Self::Pgvector => "pgvector",
            Self::Pgxs => "pgxs",
        };
        f.write_str(s)
    }
}

/// Functional check run against a live instance once the extension is created.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    Graph,
    Hypertable,
    VectorsIndex,
    PgvectorIndex,
}

/// Engine-side settings shared by every extension kind.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExtensionSettings {
    #[serde(default)]
    pub shared_preload_libraries: Vec<String>,
    #[serde(default)]
    pub search_path: Vec<String>,
    #[serde(default)]
    pub sql_name: Option<String>,
    /// Drop and recreate instead of `CREATE EXTENSION IF NOT EXISTS`.
    #[serde(default)]
    pub recreate: bool,
    #[serde(default)]
    pub load: bool,
    /// Libraries to expose under the engine's `plugins/` directory.
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub probe: Option<ProbeKind>,
}

/// Extensions in manifest order. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions(Vec<ExtensionSpec>);

impl Extensions {
    pub fn new(entries: Vec<ExtensionSpec>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtensionSpec> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionSpec> {
        self.0.iter().find(|e| e.name == *name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SQL names of every extension, in manifest order.
    pub fn sql_names(&self) -> Vec<String> {
        self.0.iter().map(|e| e.sql_name().to_owned()).collect()
    }
}

impl<'a> IntoIterator for &'a Extensions {
    type Item = &'a ExtensionSpec;
    type IntoIter = std::slice::Iter<'a, ExtensionSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

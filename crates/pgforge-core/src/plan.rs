//! SQL statement plans for the bootstrap, verify and functional-test phases.

use pgforge_schema::{EngineConfig, Manifest, ProbeKind};
use serde::Serialize;

/// One statement plus the human-readable description reported on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlStep {
    pub sql: String,
    pub description: String,
}

impl SqlStep {
    fn new(sql: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            description: description.into(),
        }
    }
}

/// Double-quoted SQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Per-extension drop/create/load in manifest order, then the session
/// search path.
///
/// `recreate` drops without `CASCADE`: objects depending on the extension
/// make the statement fail instead of being removed.
pub fn bootstrap_steps(manifest: &Manifest, engine_config: &EngineConfig) -> Vec<SqlStep> {
    let mut steps = Vec::new();
    for ext in &manifest.extensions {
        let sql_name = ext.sql_name();
        let ident = quote_ident(sql_name);
        if ext.settings.recreate {
            steps.push(SqlStep::new(
                format!("DROP EXTENSION IF EXISTS {ident};"),
                format!("drop extension {sql_name}"),
            ));
            steps.push(SqlStep::new(
                format!("CREATE EXTENSION {ident};"),
                format!("create extension {sql_name}"),
            ));
        } else {
            steps.push(SqlStep::new(
                format!("CREATE EXTENSION IF NOT EXISTS {ident};"),
                format!("create extension {sql_name}"),
            ));
        }
        if ext.settings.load {
            steps.push(SqlStep::new(
                format!("LOAD {};", quote_literal(sql_name)),
                format!("load {sql_name}"),
            ));
        }
    }
    if !engine_config.search_path.is_empty() {
        steps.push(SqlStep::new(
            format!("SET search_path = {};", engine_config.effective_search_path().join(", ")),
            "set search path",
        ));
    }
    steps
}

pub fn verify_statement(manifest: &Manifest) -> String {
    let names = manifest
        .extensions
        .sql_names()
        .iter()
        .map(|n| quote_literal(n))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT extname, extversion FROM pg_extension WHERE extname IN ({names});")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledExtension {
    pub name: String,
    pub version: String,
}

/// Parse `psql`'s aligned table output into rows. Header, separator and
/// row-count footer lines are skipped.
pub fn parse_extension_rows(output: &str) -> Vec<InstalledExtension> {
    output
        .lines()
        .filter_map(|line| {
            let (name, version) = line.split_once('|')?;
            let name = name.trim();
            let version = version.trim();
            if name.is_empty() || name == "extname" {
                return None;
            }
            Some(InstalledExtension {
                name: name.to_owned(),
                version: version.to_owned(),
            })
        })
        .collect()
}

const PROBE_GRAPH: &str = "pgforge_probe_graph";
const PROBE_TABLE: &str = "pgforge_probe_items";
const PROBE_METRICS: &str = "pgforge_probe_metrics";

/// Functional checks for one probe kind. Every probe cleans up after itself.
pub fn probe_steps(kind: ProbeKind) -> Vec<SqlStep> {
    match kind {
        ProbeKind::Graph => vec![
            SqlStep::new(
                format!("SELECT * FROM ag_catalog.create_graph('{PROBE_GRAPH}');"),
                "create graph",
            ),
            SqlStep::new(
                format!("SELECT * FROM ag_catalog.drop_graph('{PROBE_GRAPH}', true);"),
                "drop graph",
            ),
        ],
        ProbeKind::Hypertable => vec![
            SqlStep::new(
                format!("DROP TABLE IF EXISTS {PROBE_METRICS};"),
                "drop stale hypertable",
            ),
            SqlStep::new(
                format!(
                    "CREATE TABLE {PROBE_METRICS} (time TIMESTAMPTZ NOT NULL, value DOUBLE PRECISION);"
                ),
                "create table",
            ),
            SqlStep::new(
                format!("SELECT create_hypertable('{PROBE_METRICS}', 'time');"),
                "create hypertable",
            ),
            SqlStep::new(format!("DROP TABLE {PROBE_METRICS};"), "drop hypertable"),
        ],
        ProbeKind::VectorsIndex => vector_probe(
            "ARRAY[random(), random(), random()]::real[]",
            "vectors (embedding vector_l2_ops)",
        ),
        ProbeKind::PgvectorIndex => vector_probe(
            "ARRAY[random(), random(), random()]::vector",
            "hnsw (embedding vector_l2_ops)",
        ),
    }
}

fn vector_probe(row_expr: &str, index: &str) -> Vec<SqlStep> {
    vec![
        SqlStep::new(
            format!("DROP TABLE IF EXISTS {PROBE_TABLE};"),
            "drop stale vector table",
        ),
        SqlStep::new(
            format!("CREATE TABLE {PROBE_TABLE} (id bigserial PRIMARY KEY, embedding vector(3) NOT NULL);"),
            "create vector table",
        ),
        SqlStep::new(
            format!(
                "INSERT INTO {PROBE_TABLE} (embedding) SELECT {row_expr} FROM generate_series(1, 100);"
            ),
            "insert synthetic rows",
        ),
        SqlStep::new(
            format!("CREATE INDEX ON {PROBE_TABLE} USING {index};"),
            "create vector index",
        ),
        SqlStep::new(
            format!("SELECT id FROM {PROBE_TABLE} ORDER BY embedding <-> '[3,2,1]' LIMIT 5;"),
            "nearest-neighbor query",
        ),
        SqlStep::new(format!("DROP TABLE {PROBE_TABLE};"), "drop vector table"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgforge_schema::{extract_engine_config, parse_manifest_str};

    const MANIFEST: &str = r#"
manifest_version = 1
base_image = "postgres:16"
engine_version = "16"

[extensions.vectors]
type = "tarball"
sql_name = "vectors"
shared_preload_libraries = ["vectors.so"]
search_path = ["vectors"]
recreate = true
load = true

[extensions.age]
type = "tarball"
shared_preload_libraries = ["age"]
search_path = ["ag_catalog"]
load = true

[extensions.timescaledb]
type = "tarball"
"#;

    fn manifest() -> Manifest {
        parse_manifest_str(MANIFEST).unwrap()
    }

    #[test]
    fn bootstrap_follows_manifest_order() {
        let m = manifest();
        let steps = bootstrap_steps(&m, &extract_engine_config(&m));
        let sql: Vec<&str> = steps.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "DROP EXTENSION IF EXISTS \"vectors\";",
                "CREATE EXTENSION \"vectors\";",
                "LOAD 'vectors';",
                "CREATE EXTENSION IF NOT EXISTS \"age\";",
                "LOAD 'age';",
                "CREATE EXTENSION IF NOT EXISTS \"timescaledb\";",
                "SET search_path = vectors, ag_catalog, \"$user\", public;",
            ]
        );
        assert_eq!(steps[3].description, "create extension age");
    }

    #[test]
    fn recreate_never_cascades() {
        let m = manifest();
        let steps = bootstrap_steps(&m, &extract_engine_config(&m));
        assert!(steps.iter().all(|s| !s.sql.contains("CASCADE")));
    }

    #[test]
    fn names_are_quoted_in_statements() {
        let m = parse_manifest_str(
            r#"
manifest_version = 1
base_image = "postgres:16"
engine_version = "16"

[extensions.uuid]
type = "tarball"
sql_name = "uuid-ossp"
recreate = true
load = true

[extensions.odd]
type = "tarball"
sql_name = "we\"ird's"
load = true
"#,
        )
        .unwrap();
        let steps = bootstrap_steps(&m, &extract_engine_config(&m));
        let sql: Vec<&str> = steps.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "DROP EXTENSION IF EXISTS \"uuid-ossp\";",
                "CREATE EXTENSION \"uuid-ossp\";",
                "LOAD 'uuid-ossp';",
                "CREATE EXTENSION IF NOT EXISTS \"we\"\"ird's\";",
                "LOAD 'we\"ird''s';",
            ]
        );
        assert_eq!(steps[0].description, "drop extension uuid-ossp");
        assert_eq!(
            verify_statement(&m),
            "SELECT extname, extversion FROM pg_extension WHERE extname IN ('uuid-ossp', 'we\"ird''s');"
        );
    }

    #[test]
    fn no_search_path_step_without_entries() {
        let m = parse_manifest_str(
            "manifest_version = 1\nbase_image = \"postgres:16\"\nengine_version = \"16\"\n[extensions.x]\ntype = \"t\"\n",
        )
        .unwrap();
        let steps = bootstrap_steps(&m, &extract_engine_config(&m));
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn verify_lists_every_sql_name() {
        assert_eq!(
            verify_statement(&manifest()),
            "SELECT extname, extversion FROM pg_extension WHERE extname IN ('vectors', 'age', 'timescaledb');"
        );
    }

    #[test]
    fn parses_aligned_psql_output() {
        let output = " extname     | extversion \n-------------+------------\n age         | 1.5.0\n timescaledb | 2.17.2\n(2 rows)\n";
        assert_eq!(
            parse_extension_rows(output),
            vec![
                InstalledExtension {
                    name: "age".to_owned(),
                    version: "1.5.0".to_owned()
                },
                InstalledExtension {
                    name: "timescaledb".to_owned(),
                    version: "2.17.2".to_owned()
                },
            ]
        );
        assert!(parse_extension_rows("").is_empty());
    }

    #[test]
    fn probes_clean_up_after_themselves() {
        for kind in [
            ProbeKind::Graph,
            ProbeKind::Hypertable,
            ProbeKind::VectorsIndex,
            ProbeKind::PgvectorIndex,
        ] {
            let steps = probe_steps(kind);
            let last = steps.last().unwrap();
            assert!(
                last.sql.starts_with("DROP") || last.sql.contains("drop_graph"),
                "{kind:?} leaves state behind: {}",
                last.sql
            );
        }
    }

    #[test]
    fn vector_probes_use_their_index_method() {
        assert!(probe_steps(ProbeKind::VectorsIndex)
            .iter()
            .any(|s| s.sql.contains("USING vectors")));
        assert!(probe_steps(ProbeKind::PgvectorIndex)
            .iter()
            .any(|s| s.sql.contains("USING hnsw")));
    }
}

use pgforge_core::{generate, generate_with_options, GenerateOptions, GenerationError};
use pgforge_schema::parse_manifest_file;
use std::fs;

const MANIFEST: &str = r#"
manifest_version = 1
base_image = "postgres:16"
engine_version = "16"

[dependencies]
build = ["git", "build-essential", "cmake", "postgresql-server-dev-16", "git"]
runtime = ["curl", "ca-certificates", "jq", "curl"]

[extensions.vectors]
type = "package"
name = "vectors-pg16"
repository = { type = "github", owner = "tensorchord", repo = "pgvecto.rs" }
architectures = { amd64 = "linux-amd64", arm64 = "linux-arm64" }

[extensions.age]
type = "source"
family = "age"
repository = { type = "git", url = "https://github.com/apache/age.git", branch = "PG16", depth = 1 }
build = { directory = "/tmp/age" }

[extensions.timescaledb]
type = "source"
family = "timescaledb"
repository = { type = "git", url = "https://github.com/timescale/timescaledb.git" }
build = { directory = "/tmp/timescaledb" }
"#;

fn write_manifest(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pgforge.toml");
    fs::write(&path, content).unwrap();
    (dir, path)
}

#[test]
fn amd64_build_selects_amd64_asset() {
    let (_dir, path) = write_manifest(MANIFEST);
    let manifest = parse_manifest_file(&path).unwrap();
    let options = GenerateOptions {
        architectures: vec!["amd64".to_owned()],
    };
    let text = generate_with_options(&manifest, &options).unwrap().render();

    assert!(text.contains("amd64) ASSET_PATTERN='linux-amd64' ;;"));
    assert!(!text.contains("linux-arm64"));
}

#[test]
fn default_build_covers_both_architectures() {
    let (_dir, path) = write_manifest(MANIFEST);
    let manifest = parse_manifest_file(&path).unwrap();
    let text = generate(&manifest).unwrap().render();

    let amd = text.find("amd64) ASSET_PATTERN='linux-amd64'").unwrap();
    let arm = text.find("arm64) ASSET_PATTERN='linux-arm64'").unwrap();
    assert!(amd < arm);
    assert!(text.contains("*) echo \"vectors: unsupported architecture $TARGETARCH\" >&2; exit 1 ;;"));
}

#[test]
fn extension_blocks_follow_manifest_order() {
    let (_dir, path) = write_manifest(MANIFEST);
    let manifest = parse_manifest_file(&path).unwrap();
    let text = generate(&manifest).unwrap().render();

    let vectors = text.find("# vectors (package)").unwrap();
    let age = text.find("# age (source)").unwrap();
    let timescale = text.find("# timescaledb (source)").unwrap();
    assert!(vectors < age && age < timescale);
}

#[test]
fn install_line_is_sorted_and_unique() {
    let (_dir, path) = write_manifest(MANIFEST);
    let manifest = parse_manifest_file(&path).unwrap();
    let script = generate(&manifest).unwrap();

    let install = script
        .lines()
        .iter()
        .find(|l| l.contains("apt-get install -y --no-install-recommends"))
        .unwrap();
    let packages: Vec<&str> = install
        .split("--no-install-recommends")
        .nth(1)
        .unwrap()
        .split_whitespace()
        .filter(|p| *p != "\\")
        .collect();
    assert_eq!(
        packages,
        vec![
            "build-essential",
            "ca-certificates",
            "cmake",
            "curl",
            "git",
            "jq",
            "postgresql-server-dev-16",
        ]
    );
}

#[test]
fn identical_manifests_produce_identical_scripts() {
    let (_a, path_a) = write_manifest(MANIFEST);
    let (_b, path_b) = write_manifest(MANIFEST);
    let a = generate(&parse_manifest_file(&path_a).unwrap()).unwrap();
    let b = generate(&parse_manifest_file(&path_b).unwrap()).unwrap();
    assert_eq!(a.render(), b.render());
    assert_eq!(a.digest(), b.digest());
    assert_eq!(a.to_string(), a.render());
}

#[test]
fn cleanup_list_is_fixed() {
    let (_dir, path) = write_manifest(MANIFEST);
    let text = generate(&parse_manifest_file(&path).unwrap())
        .unwrap()
        .render();
    assert!(text.contains(
        "RUN apt-get purge -y --auto-remove build-essential cmake git jq wget \"postgresql-server-dev-${PG_MAJOR}\" \\"
    ));
    assert!(text.contains("    && rm -rf /var/lib/apt/lists/*"));
}

#[test]
fn failed_generation_yields_no_script() {
    let broken = MANIFEST.replace(
        "architectures = { amd64 = \"linux-amd64\", arm64 = \"linux-arm64\" }",
        "architectures = { amd64 = \"linux-amd64\" }",
    );
    let (_dir, path) = write_manifest(&broken);
    let manifest = parse_manifest_file(&path).unwrap();
    match generate(&manifest) {
        Err(GenerationError::MissingArchitecture {
            extension,
            architecture,
        }) => {
            assert_eq!(extension, "vectors".to_owned());
            assert_eq!(architecture, "arm64");
        }
        other => panic!("expected missing architecture, got {other:?}"),
    }
}

//! Build-script generation.
//!
//! Turns a [`Manifest`] into a Dockerfile-syntax [`BuildScript`]. Generation
//! is pure: the same manifest and options always produce byte-identical
//! output, and a failure never yields a partial script.

use crate::shell::shell_quote;
use pgforge_schema::{
    ExtensionFamily, ExtensionKind, ExtensionName, ExtensionSpec, Manifest, PackageSpec,
    Repository, SourceSpec,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Architectures every package extension must map, in emission order.
pub const DEFAULT_ARCHITECTURES: &[&str] = &["amd64", "arm64"];

/// Build-only packages purged at the end of the build. This is deliberately
/// independent of `dependencies.build`.
pub const CLEANUP_PACKAGES: &[&str] = &[
    "build-essential",
    "cmake",
    "git",
    "jq",
    "wget",
    "\"postgresql-server-dev-${PG_MAJOR}\"",
];

const CA_CERTIFICATES: &str = "ca-certificates";
const CONTINUATION: &str = " \\";
const INDENT: &str = "    ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("extension '{extension}' has no asset pattern for architecture '{architecture}'")]
    MissingArchitecture {
        extension: ExtensionName,
        architecture: String,
    },
    #[error("extension '{extension}' has unsupported type '{tag}'")]
    UnknownVariant { extension: ExtensionName, tag: String },
    #[error("extension '{extension}' ({family}) must pin a repository branch")]
    MissingBranch {
        extension: ExtensionName,
        family: ExtensionFamily,
    },
    #[error("extension '{extension}': cannot resolve latest release for '{url}' (GitHub URL required)")]
    UnresolvableRelease { extension: ExtensionName, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    pub architectures: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            architectures: DEFAULT_ARCHITECTURES
                .iter()
                .map(|a| (*a).to_owned())
                .collect(),
        }
    }
}

/// Ordered build-script lines. Produced whole, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildScript {
    lines: Vec<String>,
}

impl BuildScript {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    /// Blake3 hex digest of the rendered text.
    pub fn digest(&self) -> String {
        blake3::hash(self.render().as_bytes()).to_hex().to_string()
    }
}

impl fmt::Display for BuildScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

pub fn generate(manifest: &Manifest) -> Result<BuildScript, GenerationError> {
    generate_with_options(manifest, &GenerateOptions::default())
}

pub fn generate_with_options(
    manifest: &Manifest,
    options: &GenerateOptions,
) -> Result<BuildScript, GenerationError> {
    let mut lines = vec![format!("FROM {}", manifest.base_image), String::new()];

    lines.push("ARG TARGETARCH".to_owned());
    lines.push(format!("ARG PG_MAJOR={}", manifest.engine_version));
    lines.push(String::new());

    let packages = manifest.dependencies.merged();
    if !packages.is_empty() {
        push_run(
            &mut lines,
            &[
                "apt-get update".to_owned(),
                format!(
                    "apt-get install -y --no-install-recommends {}",
                    packages.join(" ")
                ),
            ],
        );
        lines.push(String::new());
    }

    if manifest.dependencies.has_runtime(CA_CERTIFICATES) {
        lines.push("RUN update-ca-certificates".to_owned());
        lines.push(String::new());
    }

    for ext in &manifest.extensions {
        lines.push(format!("# {} ({})", ext.name, ext.kind.tag()));
        let steps = match &ext.kind {
            ExtensionKind::Package(pkg) => package_steps(ext, pkg, &options.architectures)?,
            ExtensionKind::Source(src) => source_steps(ext, src)?,
            ExtensionKind::Unsupported(tag) => {
                return Err(GenerationError::UnknownVariant {
                    extension: ext.name.clone(),
                    tag: tag.clone(),
                })
            }
        };
        push_run(&mut lines, &steps);
        lines.push(String::new());
    }

    push_run(
        &mut lines,
        &[
            format!("apt-get purge -y --auto-remove {}", CLEANUP_PACKAGES.join(" ")),
            "apt-get autoremove -y".to_owned(),
            "apt-get clean".to_owned(),
            "rm -rf /var/lib/apt/lists/*".to_owned(),
        ],
    );
    lines.push(String::new());

    lines.push("CMD [\"postgres\"]".to_owned());

    Ok(BuildScript { lines })
}

/// Emit one `RUN` instruction chaining `steps` with `&&`.
fn push_run(lines: &mut Vec<String>, steps: &[String]) {
    let last = steps.len().saturating_sub(1);
    for (i, step) in steps.iter().enumerate() {
        let mut line = if i == 0 {
            format!("RUN {step}")
        } else {
            format!("{INDENT}&& {step}")
        };
        if i != last {
            line.push_str(CONTINUATION);
        }
        lines.extend(line.split('\n').map(str::to_owned));
    }
}

fn latest_release_api(owner: &str, repo: &str) -> String {
    format!("https://api.github.com/repos/{owner}/{repo}/releases/latest")
}

fn package_steps(
    ext: &ExtensionSpec,
    pkg: &PackageSpec,
    architectures: &[String],
) -> Result<Vec<String>, GenerationError> {
    let Repository::Github { owner, repo } = &pkg.repository else {
        return Err(GenerationError::UnknownVariant {
            extension: ext.name.clone(),
            tag: ext.kind.tag().to_owned(),
        });
    };

    let mut branches = Vec::with_capacity(architectures.len());
    for arch in architectures {
        let pattern =
            pkg.architectures
                .get(arch)
                .ok_or_else(|| GenerationError::MissingArchitecture {
                    extension: ext.name.clone(),
                    architecture: arch.clone(),
                })?;
        branches.push(format!("{arch}) ASSET_PATTERN={} ;;", shell_quote(pattern)));
    }

    let mut case = String::from("case \"$TARGETARCH\" in");
    for branch in &branches {
        case.push_str(CONTINUATION);
        case.push('\n');
        case.push_str(INDENT);
        case.push_str(INDENT);
        case.push_str(branch);
    }
    case.push_str(CONTINUATION);
    case.push('\n');
    case.push_str(&format!(
        "{INDENT}{INDENT}*) echo \"{}: unsupported architecture $TARGETARCH\" >&2; exit 1 ;;",
        ext.name
    ));
    case.push_str(CONTINUATION);
    case.push('\n');
    case.push_str(INDENT);
    case.push_str("esac");

    let artifact = shell_quote(&format!("/tmp/{}.deb", pkg.name));
    Ok(vec![
        format!(
            "RELEASE_JSON=\"$(curl -fsSL {})\"",
            latest_release_api(owner, repo)
        ),
        case,
        format!(
            "ASSET_URL=\"$(echo \"$RELEASE_JSON\" | jq -r '.assets[].browser_download_url' | grep -F {} | grep -F \"$ASSET_PATTERN\" | grep '\\.deb$' | head -n 1)\"",
            shell_quote(&pkg.name)
        ),
        "test -n \"$ASSET_URL\"".to_owned(),
        format!("curl -fsSL -o {artifact} \"$ASSET_URL\""),
        format!("dpkg -i {artifact}"),
        format!("rm -f {artifact}"),
    ])
}

/// How a source family settles on the revision it builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Revision {
    PinnedBranch,
    LatestRelease,
    BranchIfGiven,
}

struct Recipe {
    revision: Revision,
    build: &'static [&'static str],
}

fn recipe(family: ExtensionFamily) -> Recipe {
    match family {
        ExtensionFamily::Age => Recipe {
            revision: Revision::PinnedBranch,
            build: &["make", "make install"],
        },
        ExtensionFamily::Timescaledb => Recipe {
            revision: Revision::LatestRelease,
            build: &[
                "./bootstrap -DREGRESS_CHECKS=OFF",
                "cd build",
                "make",
                "make install",
            ],
        },
        ExtensionFamily::Pgvector => Recipe {
            revision: Revision::LatestRelease,
            build: &["make OPTFLAGS=\"\"", "make install"],
        },
        ExtensionFamily::Pgxs => Recipe {
            revision: Revision::BranchIfGiven,
            build: &["make", "make install"],
        },
    }
}

/// Extract `(owner, repo)` from a GitHub clone URL.
pub fn github_repo_from_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
        .or_else(|| url.strip_prefix("git@github.com:"))?;
    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_owned(), repo.to_owned()))
}

fn source_steps(ext: &ExtensionSpec, src: &SourceSpec) -> Result<Vec<String>, GenerationError> {
    let Repository::Git { url, depth, branch } = &src.repository else {
        return Err(GenerationError::UnknownVariant {
            extension: ext.name.clone(),
            tag: ext.kind.tag().to_owned(),
        });
    };
    let recipe = recipe(src.family);
    let dir = shell_quote(&src.build.directory);

    let mut clone = String::from("git clone");
    if let Some(depth) = depth {
        clone.push_str(&format!(" --depth {depth}"));
    }
    if let Some(branch) = branch {
        clone.push_str(&format!(" --branch {}", shell_quote(branch)));
    }
    clone.push_str(&format!(" {} {dir}", shell_quote(url)));

    let mut steps = vec![format!("rm -rf {dir}"), clone, format!("cd {dir}")];

    match recipe.revision {
        Revision::PinnedBranch => {
            let branch = branch.as_ref().ok_or(GenerationError::MissingBranch {
                extension: ext.name.clone(),
                family: src.family,
            })?;
            steps.push(format!("git checkout {}", shell_quote(branch)));
        }
        Revision::BranchIfGiven => {
            if let Some(branch) = branch {
                steps.push(format!("git checkout {}", shell_quote(branch)));
            }
        }
        Revision::LatestRelease => {
            let (owner, repo) =
                github_repo_from_url(url).ok_or_else(|| GenerationError::UnresolvableRelease {
                    extension: ext.name.clone(),
                    url: url.clone(),
                })?;
            steps.push(format!(
                "RELEASE_TAG=\"$(curl -fsSL {} | jq -r '.tag_name')\"",
                latest_release_api(&owner, &repo)
            ));
            if let Some(depth) = depth {
                // A shallow clone does not carry the release tag.
                steps.push(format!(
                    "git fetch --depth {depth} origin tag \"$RELEASE_TAG\""
                ));
            }
            steps.push("git checkout \"$RELEASE_TAG\"".to_owned());
        }
    }

    steps.extend(recipe.build.iter().map(|s| (*s).to_owned()));
    Ok(steps)
}

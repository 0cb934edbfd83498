pub mod build;
pub mod completions;
pub mod doctor;
pub mod full_setup;
pub mod functional;
pub mod generate;
pub mod man_pages;
pub mod remove;
pub mod start;
pub mod verify;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use pgforge_core::{generate_with_options, BuildScript, GenerateOptions, LifecycleConfig};
use pgforge_schema::{parse_manifest_file, ContainerName, Manifest, VolumeName};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;

/// Container settings shared by every command that touches a container.
/// Unset flags fall back to the environment, then to built-in defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct ContainerArgs {
    /// Name of the database container.
    #[arg(long)]
    pub container_name: Option<String>,
    /// Host port mapped to the engine (overrides POSTGRES_PORT).
    #[arg(long)]
    pub port: Option<u16>,
    /// Data volume name (overrides POSTGRES_VOLUME).
    #[arg(long)]
    pub volume: Option<String>,
    /// Image tag to build or run.
    #[arg(long)]
    pub image: Option<String>,
}

impl ContainerArgs {
    pub fn resolve(&self) -> Result<LifecycleConfig, String> {
        let mut config = LifecycleConfig::from_env().map_err(|e| e.to_string())?;
        if let Some(name) = &self.container_name {
            config.container_name = ContainerName::new(name.as_str());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(volume) = &self.volume {
            config.volume = VolumeName::new(volume.as_str());
        }
        if let Some(image) = &self.image {
            config.image.clone_from(image);
        }
        Ok(config)
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest, String> {
    parse_manifest_file(path).map_err(|e| format!("manifest error: {e}"))
}

pub fn generate_script(manifest: &Manifest, architectures: &[String]) -> Result<BuildScript, String> {
    let options = if architectures.is_empty() {
        GenerateOptions::default()
    } else {
        GenerateOptions {
            architectures: architectures.to_vec(),
        }
    };
    generate_with_options(manifest, &options).map_err(|e| format!("generation error: {e}"))
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Spinner unless output is JSON.
pub fn maybe_spinner(json: bool, msg: &str) -> Option<ProgressBar> {
    if json {
        None
    } else {
        Some(spinner(msg))
    }
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "pass" | "installed" => Style::new().green().apply_to(status).to_string(),
        "fail" | "missing" => Style::new().red().bold().apply_to(status).to_string(),
        "warn" | "skipped" => Style::new().yellow().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

use super::{colorize_status, json_pretty, load_manifest, EXIT_FAILURE, EXIT_SUCCESS};
use pgforge_core::{LifecycleConfig, Orchestrator};
use pgforge_runtime::{ContainerRuntime, PgIsReady, PsqlEndpoint};
use std::path::Path;

pub fn run(
    runtime: &dyn ContainerRuntime,
    manifest_path: &Path,
    config: LifecycleConfig,
    json: bool,
) -> Result<u8, String> {
    let manifest = load_manifest(manifest_path)?;
    let sql = PsqlEndpoint::new(runtime);
    let probe = PgIsReady::new(runtime, config.user.as_str());
    let report = Orchestrator::new(runtime, &sql, &probe, &manifest, config)
        .verify()
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for row in &report.installed {
            println!("  {} {} ({})", row.name, row.version, colorize_status("installed"));
        }
        for name in &report.missing {
            println!("  {name} ({})", colorize_status("missing"));
        }
    }
    Ok(if report.missing.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

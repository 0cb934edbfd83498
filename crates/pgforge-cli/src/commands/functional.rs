use super::{
    colorize_status, json_pretty, load_manifest, maybe_spinner, spin_fail, spin_ok, EXIT_SUCCESS,
};
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

    let pb = maybe_spinner(json, "running extension probes...");
    let result = Orchestrator::new(runtime, &sql, &probe, &manifest, config).run_functional_tests();
    let report = match result {
        Ok(report) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "extension probes passed");
            }
            report
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "extension probe failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for name in &report.passed {
            println!("  {name} ({})", colorize_status("pass"));
        }
        for name in &report.skipped {
            println!("  {name} ({})", colorize_status("skipped"));
        }
    }
    Ok(EXIT_SUCCESS)
}

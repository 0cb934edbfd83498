use super::{json_pretty, load_manifest, maybe_spinner, spin_fail, spin_ok, EXIT_SUCCESS};
use pgforge_core::{LifecycleConfig, LifecycleReport, Orchestrator, Phase};
use pgforge_runtime::{ContainerRuntime, PgIsReady, PsqlEndpoint};
use std::path::Path;

/// Tear down any previous container and run the whole lifecycle.
pub fn run_lifecycle(
    runtime: &dyn ContainerRuntime,
    manifest_path: &Path,
    config: LifecycleConfig,
    json: bool,
) -> Result<LifecycleReport, String> {
    let manifest = load_manifest(manifest_path)?;
    let sql = PsqlEndpoint::new(runtime);
    let probe = PgIsReady::new(runtime, config.user.as_str());
    let container = config.container_name.to_string();

    let pb = maybe_spinner(json, &format!("starting {container}..."));
    let show_phase = |phase: Phase| {
        if let Some(ref pb) = pb {
            pb.set_message(format!("{container}: {phase}"));
        }
    };
    let result = Orchestrator::new(runtime, &sql, &probe, &manifest, config)
        .with_phase_observer(&show_phase)
        .run_full_lifecycle();

    match result {
        Ok(report) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("{container} is ready"));
            }
            Ok(report)
        }
        Err(failure) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{container}: {} failed", failure.phase));
            }
            Err(failure.to_string())
        }
    }
}

pub fn print_report(report: &LifecycleReport, port: u16, json: bool) -> Result<(), String> {
    if json {
        println!("{}", json_pretty(report)?);
        return Ok(());
    }
    println!("engine: PostgreSQL {}", report.engine_major);
    for row in &report.verify.installed {
        println!("  {} {}", row.name, row.version);
    }
    for name in &report.verify.missing {
        println!("  {name} ({})", super::colorize_status("missing"));
    }
    if !report.tests.passed.is_empty() {
        println!("tests passed: {}", report.tests.passed.join(", "));
    }
    println!("listening on localhost:{port}");
    Ok(())
}

pub fn run(
    runtime: &dyn ContainerRuntime,
    manifest_path: &Path,
    config: LifecycleConfig,
    json: bool,
) -> Result<u8, String> {
    let port = config.port;
    let report = run_lifecycle(runtime, manifest_path, config, json)?;
    print_report(&report, port, json)?;
    Ok(EXIT_SUCCESS)
}

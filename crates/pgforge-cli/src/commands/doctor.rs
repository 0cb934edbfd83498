use super::{generate_script, ContainerArgs, EXIT_FAILURE, EXIT_SUCCESS};
use pgforge_runtime::{check_docker_prereqs, format_missing, host_platform, port_in_use};
use pgforge_schema::parse_manifest_file;
use std::path::Path;

pub fn run(
    runtime_name: &str,
    manifest_path: &Path,
    container: &ContainerArgs,
    json_output: bool,
) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_prereqs(runtime_name, &mut checks, &mut all_pass);
    check_platform(&mut checks, &mut all_pass);
    check_manifest(manifest_path, &mut checks, &mut all_pass);

    match container.resolve() {
        Ok(config) => {
            if port_in_use(config.port) {
                checks.push(Check::warn(
                    "port",
                    &format!("Port {} is in use (start would fail unless it is ours)", config.port),
                ));
            } else {
                checks.push(Check::pass("port", &format!("Port {} is free", config.port)));
            }
        }
        Err(e) => {
            all_pass = false;
            checks.push(Check::fail("config", &format!("Invalid configuration: {e}")));
        }
    }

    if Path::new(".env").exists() {
        checks.push(Check::info("dotenv", "Loaded settings from .env"));
    }

    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(runtime_name: &str, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if runtime_name == "mock" {
        checks.push(Check::info("runtime_prereqs", "Mock runtime selected, skipping tool checks"));
        return;
    }
    let missing = check_docker_prereqs(runtime_name);
    if missing.is_empty() {
        checks.push(Check::pass(
            "runtime_prereqs",
            &format!("{runtime_name} and buildx available"),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "runtime_prereqs",
            &format!("Missing prerequisites: {}", format_missing(&missing)),
        ));
    }
}

fn check_platform(checks: &mut Vec<Check>, all_pass: &mut bool) {
    match host_platform() {
        Ok(platform) => checks.push(Check::pass(
            "platform",
            &format!("Host platform {platform}"),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "platform",
                &format!("{e} (pass --platform explicitly)"),
            ));
        }
    }
}

fn check_manifest(path: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if !path.exists() {
        checks.push(Check::info(
            "manifest",
            &format!("No manifest at {}", path.display()),
        ));
        return;
    }
    let manifest = match parse_manifest_file(path) {
        Ok(m) => m,
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("manifest", &format!("{}: {e}", path.display())));
            return;
        }
    };
    checks.push(Check::pass(
        "manifest",
        &format!(
            "{} is valid ({} extensions)",
            path.display(),
            manifest.extensions.len()
        ),
    ));
    match generate_script(&manifest, &[]) {
        Ok(script) => checks.push(Check::pass(
            "build_script",
            &format!("Build script generates (digest {})", &script.digest()[..12]),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("build_script", &e));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("pgforge doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

use super::build::{build_image, BuildArgs};
use super::start::{print_report, run_lifecycle};
use super::EXIT_SUCCESS;
use pgforge_core::LifecycleConfig;
use pgforge_runtime::ContainerRuntime;

pub fn run(
    runtime: &dyn ContainerRuntime,
    build: &BuildArgs<'_>,
    config: LifecycleConfig,
    json: bool,
) -> Result<u8, String> {
    let built = build_image(runtime, build, json)?;
    if !json {
        println!("script digest: {}", built.digest);
    }
    let port = config.port;
    let report = run_lifecycle(runtime, build.manifest, config, json)?;
    print_report(&report, port, json)?;
    Ok(EXIT_SUCCESS)
}

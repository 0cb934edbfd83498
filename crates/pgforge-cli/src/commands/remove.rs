use super::{json_pretty, EXIT_SUCCESS};
use pgforge_core::LifecycleConfig;
use pgforge_runtime::ContainerRuntime;

pub fn run(
    runtime: &dyn ContainerRuntime,
    config: &LifecycleConfig,
    remove_volume: bool,
    json: bool,
) -> Result<u8, String> {
    let name = config.container_name.as_str();
    let outcome = runtime
        .remove(name, remove_volume)
        .map_err(|e| e.to_string())?;

    if json {
        let payload = serde_json::json!({
            "container": name,
            "container_removed": outcome.container_removed,
            "volume_removed": outcome.volume_removed,
        });
        println!("{}", json_pretty(&payload)?);
    } else if outcome.container_removed {
        println!("removed container {name}");
        if let Some(volume) = outcome.volume_removed {
            println!("removed volume {volume}");
        }
    } else {
        println!("container {name} not found, nothing to remove");
    }
    Ok(EXIT_SUCCESS)
}

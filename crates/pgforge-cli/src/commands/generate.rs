use super::{generate_script, json_pretty, load_manifest, EXIT_SUCCESS};
use std::path::Path;

pub fn run(
    manifest_path: &Path,
    output: Option<&Path>,
    architectures: &[String],
    json: bool,
) -> Result<u8, String> {
    let manifest = load_manifest(manifest_path)?;
    let script = generate_script(&manifest, architectures)?;
    let digest = script.digest();

    match output {
        Some(path) => {
            std::fs::write(path, script.render())
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            if json {
                let payload = serde_json::json!({
                    "path": path.display().to_string(),
                    "digest": digest,
                    "lines": script.lines().len(),
                });
                println!("{}", json_pretty(&payload)?);
            } else {
                println!("wrote {} ({} lines)", path.display(), script.lines().len());
                println!("digest: {digest}");
            }
        }
        None if json => {
            let payload = serde_json::json!({
                "digest": digest,
                "script": script.render(),
            });
            println!("{}", json_pretty(&payload)?);
        }
        None => print!("{script}"),
    }
    Ok(EXIT_SUCCESS)
}

use super::{
    generate_script, json_pretty, load_manifest, maybe_spinner, spin_fail, spin_ok, EXIT_SUCCESS,
};
use pgforge_runtime::{host_platform, BuildRequest, ContainerRuntime};
use std::path::Path;
use tracing::debug;

pub struct BuildArgs<'a> {
    pub manifest: &'a Path,
    pub image: &'a str,
    pub platform: Option<&'a str>,
    pub dockerfile: Option<&'a Path>,
    pub context: &'a Path,
}

pub struct Built {
    pub image: String,
    pub platform: String,
    pub digest: String,
}

/// Generate the build script and build the image from it.
pub fn build_image(
    runtime: &dyn ContainerRuntime,
    args: &BuildArgs<'_>,
    json: bool,
) -> Result<Built, String> {
    let manifest = load_manifest(args.manifest)?;
    let script = generate_script(&manifest, &[])?;
    let text = script.render();

    if let Some(path) = args.dockerfile {
        std::fs::write(path, &text)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    }

    let platform = match args.platform {
        Some(p) => p.to_owned(),
        None => host_platform().map_err(|e| e.to_string())?.to_owned(),
    };

    let pb = maybe_spinner(json, &format!("building {} for {platform}...", args.image));
    let request = BuildRequest {
        script: &text,
        platform: &platform,
        tag: args.image,
        context: args.context,
    };
    let mut on_output = |line: &str| {
        debug!("{line}");
        if let Some(ref pb) = pb {
            pb.set_message(line.to_owned());
        }
    };

    match runtime.build(&request, &mut on_output) {
        Ok(()) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("built {} for {platform}", args.image));
            }
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "image build failed");
            }
            return Err(e.to_string());
        }
    }

    Ok(Built {
        image: args.image.to_owned(),
        platform,
        digest: script.digest(),
    })
}

pub fn run(runtime: &dyn ContainerRuntime, args: &BuildArgs<'_>, json: bool) -> Result<u8, String> {
    let built = build_image(runtime, args, json)?;
    if json {
        let payload = serde_json::json!({
            "image": built.image,
            "platform": built.platform,
            "script_digest": built.digest,
            "status": "built",
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("image: {}", built.image);
        println!("script digest: {}", built.digest);
    }
    Ok(EXIT_SUCCESS)
}

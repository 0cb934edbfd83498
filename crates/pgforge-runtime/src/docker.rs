use crate::backend::{BuildRequest, ContainerRuntime, ContainerSpec};
use crate::RuntimeError;
use pgforge_schema::VolumeName;
use std::io::{BufRead, BufReader, Write as _};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

const BUILDER_NAME: &str = "pgforge-builder";

/// Runtime backed by the `docker` CLI (or any CLI-compatible binary).
pub struct DockerRuntime {
    binary: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self {
            binary: "docker".to_owned(),
        }
    }
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    /// Run to completion and return trimmed stdout, or the stderr on failure.
    fn run(&self, args: &[&str]) -> Result<String, RuntimeError> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = self.command().args(args).output()?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    fn succeeds(&self, args: &[&str]) -> bool {
        self.command()
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Remove the builder and any buildkit containers it left behind.
    fn cleanup_builder(&self) {
        match self.run(&["buildx", "ls"]) {
            Ok(listing) if listing.contains(BUILDER_NAME) => {
                let _ = self.run(&["buildx", "rm", BUILDER_NAME]);
            }
            Ok(_) => {}
            Err(e) => warn!("failed to list buildx builders: {e}"),
        }

        let filter = format!("name=buildx_buildkit_{BUILDER_NAME}");
        match self.run(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"]) {
            Ok(names) => {
                for name in names.lines().filter(|n| !n.trim().is_empty()) {
                    let _ = self.run(&["rm", "-f", name.trim()]);
                }
            }
            Err(e) => warn!("failed to list buildkit containers: {e}"),
        }
    }

    fn buildx_build(
        &self,
        request: &BuildRequest<'_>,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<(), RuntimeError> {
        let mut script_file = tempfile::Builder::new()
            .prefix("pgforge-")
            .suffix(".dockerfile")
            .tempfile()?;
        script_file.write_all(request.script.as_bytes())?;
        script_file.flush()?;

        let script_path = script_file.path().to_string_lossy().into_owned();
        let context = request.context.to_string_lossy().into_owned();
        let args = [
            "buildx",
            "build",
            "-f",
            script_path.as_str(),
            "--platform",
            request.platform,
            "-t",
            request.tag,
            context.as_str(),
            "--load",
            "--progress=plain",
        ];
        debug!("{} {}", self.binary, args.join(" "));

        let mut child = self
            .command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Build progress arrives on stderr; stdout is drained on a helper
        // thread so neither pipe can fill up and stall the build.
        let stdout = child.stdout.take();
        let drain = std::thread::spawn(move || {
            stdout
                .map(|out| {
                    BufReader::new(out)
                        .lines()
                        .map_while(Result::ok)
                        .collect::<Vec<String>>()
                })
                .unwrap_or_default()
        });

        if let Some(stderr) = child.stderr.take() {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                on_output(&line);
            }
        }
        let stdout_lines = drain
            .join()
            .map_err(|_| RuntimeError::ExecFailed("build output reader panicked".to_owned()))?;
        for line in &stdout_lines {
            on_output(line);
        }

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::ExecFailed(format!(
                "image build exited with code {}",
                status.code().unwrap_or(1)
            )))
        }
    }
}

impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        &self.binary
    }

    fn available(&self) -> bool {
        self.succeeds(&["version"])
    }

    fn build(
        &self,
        request: &BuildRequest<'_>,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<(), RuntimeError> {
        info!("building image {} for {}", request.tag, request.platform);
        self.cleanup_builder();
        self.run(&["buildx", "create", "--name", BUILDER_NAME, "--use"])?;

        let result = self.buildx_build(request, on_output);

        info!("cleaning up builder");
        self.cleanup_builder();
        result?;
        info!("image {} built", request.tag);
        Ok(())
    }

    fn create_and_start(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        let mut args: Vec<String> = vec!["run".into(), "--name".into(), spec.name.to_string()];
        for (key, value) in &spec.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push("-p".into());
        args.push(format!("{}:{}", spec.port.host, spec.port.container));
        args.push("-v".into());
        args.push(format!("{}:{}", spec.volume.volume, spec.volume.target));
        args.push("-d".into());
        args.push(spec.image.clone());

        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs)?;
        Ok(())
    }

    fn container_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        let output = self
            .command()
            .args(["container", "inspect", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        Ok(output.success())
    }

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(&["rm", "-f", name]).map(drop)
    }

    fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(&["restart", name]).map(drop)
    }

    fn is_running(&self, name: &str) -> bool {
        self.run(&["container", "inspect", "-f", "{{.State.Running}}", name])
            .is_ok_and(|out| out.eq_ignore_ascii_case("true"))
    }

    fn exec(&self, name: &str, command: &[String]) -> Result<String, RuntimeError> {
        let mut args = vec!["exec", name];
        args.extend(command.iter().map(String::as_str));
        self.run(&args)
    }

    fn inspect_volume_of(&self, name: &str) -> Option<VolumeName> {
        let format = r#"{{range .Mounts}}{{if eq .Type "volume"}}{{.Name}}{{end}}{{end}}"#;
        match self.run(&["container", "inspect", "-f", format, name]) {
            Ok(volume) if !volume.is_empty() => Some(VolumeName::new(volume)),
            _ => None,
        }
    }

    fn volume_exists(&self, volume: &str) -> bool {
        self.succeeds(&["volume", "inspect", volume])
    }

    fn remove_volume(&self, volume: &str) -> Result<(), RuntimeError> {
        self.run(&["volume", "rm", "-f", volume]).map(drop)
    }
}

/// Map a machine architecture name to a container platform string.
pub fn platform_for_arch(arch: &str) -> Result<&'static str, RuntimeError> {
    match arch.to_lowercase().as_str() {
        "arm64" | "aarch64" => Ok("linux/arm64"),
        "x86_64" | "amd64" => Ok("linux/amd64"),
        other => Err(RuntimeError::UnsupportedArchitecture(other.to_owned())),
    }
}

/// Container platform matching the machine this process runs on.
pub fn host_platform() -> Result<&'static str, RuntimeError> {
    platform_for_arch(std::env::consts::ARCH)
}

mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::build::BuildArgs;
use commands::{ContainerArgs, EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use pgforge_core::install_signal_handler;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "pgforge",
    version,
    about = "Build and bootstrap PostgreSQL images with extensions"
)]
struct Cli {
    /// Container runtime: docker, podman, or mock.
    #[arg(long, default_value = "docker", global = true)]
    runtime: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate the image build script from a manifest.
    Generate {
        /// Path to manifest TOML file.
        #[arg(long, default_value = "pgforge.toml")]
        manifest: PathBuf,
        /// Write the script here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Target architecture to cover (repeatable; default amd64 and arm64).
        #[arg(long = "arch")]
        architectures: Vec<String>,
    },
    /// Generate the build script and build the image.
    Build {
        #[arg(long, default_value = "pgforge.toml")]
        manifest: PathBuf,
        #[command(flatten)]
        container: ContainerArgs,
        /// Target platform, e.g. linux/amd64 (default: host platform).
        #[arg(long)]
        platform: Option<String>,
        /// Also keep the generated script at this path.
        #[arg(long)]
        dockerfile: Option<PathBuf>,
        /// Build context directory.
        #[arg(long, default_value = ".")]
        context: PathBuf,
    },
    /// Replace the container and bootstrap it from an existing image.
    Start {
        #[arg(long, default_value = "pgforge.toml")]
        manifest: PathBuf,
        #[command(flatten)]
        container: ContainerArgs,
        /// Also remove the old data volume during teardown.
        #[arg(long, default_value_t = false)]
        fresh: bool,
        /// Fail when a manifest extension is not installed.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Build the image, then start and bootstrap the container.
    FullSetup {
        #[arg(long, default_value = "pgforge.toml")]
        manifest: PathBuf,
        #[command(flatten)]
        container: ContainerArgs,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        dockerfile: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        context: PathBuf,
        #[arg(long, default_value_t = false)]
        fresh: bool,
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Remove the container (and optionally its data volume).
    Remove {
        #[command(flatten)]
        container: ContainerArgs,
        /// Also remove the data volume.
        #[arg(long, default_value_t = false)]
        remove_volume: bool,
    },
    /// List the manifest's extensions as installed in the running container.
    Verify {
        #[arg(long, default_value = "pgforge.toml")]
        manifest: PathBuf,
        #[command(flatten)]
        container: ContainerArgs,
    },
    /// Run functional probes against the running container.
    Test {
        #[arg(long, default_value = "pgforge.toml")]
        manifest: PathBuf,
        #[command(flatten)]
        container: ContainerArgs,
    },
    /// Check tools, platform, manifest, and port.
    Doctor {
        #[arg(long, default_value = "pgforge.toml")]
        manifest: PathBuf,
        #[command(flatten)]
        container: ContainerArgs,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn default_image(container: &ContainerArgs) -> Result<String, String> {
    Ok(container.resolve()?.image)
}

#[allow(clippy::too_many_lines)]
fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    // Settings from .env apply unless the environment already has them.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PGFORGE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let json_output = cli.json;

    let needs_runtime = matches!(
        cli.command,
        Commands::Build { .. }
            | Commands::Start { .. }
            | Commands::FullSetup { .. }
            | Commands::Remove { .. }
            | Commands::Verify { .. }
            | Commands::Test { .. }
    );
    if needs_runtime
        && cli.runtime != "mock"
        && std::env::var("PGFORGE_SKIP_PREREQS").as_deref() != Ok("1")
    {
        let missing = pgforge_runtime::check_docker_prereqs(&cli.runtime);
        if !missing.is_empty() {
            eprintln!("error: {}", pgforge_runtime::format_missing(&missing));
            return ExitCode::from(EXIT_FAILURE);
        }
    }

    let runtime = match pgforge_runtime::select_runtime(&cli.runtime) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let runtime = runtime.as_ref();

    let result = match cli.command {
        Commands::Generate {
            manifest,
            output,
            architectures,
        } => commands::generate::run(&manifest, output.as_deref(), &architectures, json_output),
        Commands::Build {
            manifest,
            container,
            platform,
            dockerfile,
            context,
        } => default_image(&container).and_then(|image| {
            commands::build::run(
                runtime,
                &BuildArgs {
                    manifest: &manifest,
                    image: &image,
                    platform: platform.as_deref(),
                    dockerfile: dockerfile.as_deref(),
                    context: &context,
                },
                json_output,
            )
        }),
        Commands::Start {
            manifest,
            container,
            fresh,
            strict,
        } => container.resolve().and_then(|mut config| {
            config.remove_volume_on_teardown = fresh;
            config.strict_verify = strict;
            commands::start::run(runtime, &manifest, config, json_output)
        }),
        Commands::FullSetup {
            manifest,
            container,
            platform,
            dockerfile,
            context,
            fresh,
            strict,
        } => container.resolve().and_then(|mut config| {
            config.remove_volume_on_teardown = fresh;
            config.strict_verify = strict;
            let image = config.image.clone();
            commands::full_setup::run(
                runtime,
                &BuildArgs {
                    manifest: &manifest,
                    image: &image,
                    platform: platform.as_deref(),
                    dockerfile: dockerfile.as_deref(),
                    context: &context,
                },
                config,
                json_output,
            )
        }),
        Commands::Remove {
            container,
            remove_volume,
        } => container.resolve().and_then(|config| {
            commands::remove::run(runtime, &config, remove_volume, json_output)
        }),
        Commands::Verify {
            manifest,
            container,
        } => container.resolve().and_then(|config| {
            commands::verify::run(runtime, &manifest, config, json_output)
        }),
        Commands::Test {
            manifest,
            container,
        } => container.resolve().and_then(|config| {
            commands::functional::run(runtime, &manifest, config, json_output)
        }),
        Commands::Doctor {
            manifest,
            container,
        } => commands::doctor::run(&cli.runtime, &manifest, &container, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") || msg.starts_with("generation error:")
            {
                EXIT_MANIFEST_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

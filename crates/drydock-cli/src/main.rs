//! Drydock CLI
//!
//! A command-line tool and HTTP server for running code in disposable
//! Docker containers.

use std::collections::BTreeSet;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drydock::config::validate_limits;
use drydock::{
    Config, DockerRuntime, EXAMPLE_CONFIG, ExecutionRequest, Orchestrator, ResourceLimits,
};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

mod server;

#[derive(Parser)]
#[command(name = "drydock")]
#[command(about = "Run untrusted code in disposable containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: drydock.toml)
        #[arg(short, long, default_value = "drydock.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program in a fresh container
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID or alias (e.g., python, js, go)
        #[arg(short, long)]
        language: String,

        /// File piped to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Memory limit in MiB
        #[arg(short, long)]
        memory: Option<u64>,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,

    /// Pull runtime images ahead of time
    Pull {
        /// Languages to pull (default: all)
        #[arg(value_name = "LANG")]
        languages: Vec<String>,
    },

    /// Remove leftover containers created by drydock
    Prune,

    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    match cli.config {
        Some(ref path) => info!(?path, "loading configuration"),
        None => debug!("using embedded configuration with environment overrides"),
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Run {
            source,
            language,
            input,
            timeout,
            memory,
        } => {
            let overrides = command_line_limits(timeout, memory)?;
            run_execute(config, &source, &language, input.as_deref(), &overrides).await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Commands::Pull { languages } => pull_images(&config, &languages).await,
        Commands::Prune => prune(&config).await,
        Commands::Serve { listen } => {
            let docker = DockerRuntime::connect(config.docker_socket.as_deref())
                .context("failed to create docker client")?;
            match docker.ping().await {
                Ok(()) => debug!("docker daemon reachable"),
                Err(e) => warn!(error = %e, "docker daemon not reachable, executions will fail"),
            }
            server::serve(listen, Orchestrator::new(config, Arc::new(docker))).await
        }
    }
}

/// Limits given with `run`, checked like configured limits
fn command_line_limits(timeout: Option<f64>, memory_mb: Option<u64>) -> Result<ResourceLimits> {
    let limits = ResourceLimits {
        timeout,
        memory_mb,
        ..ResourceLimits::unset()
    };
    validate_limits("command line", &limits).context("invalid limits")?;
    Ok(limits)
}

async fn run_execute(
    config: Config,
    source: &Path,
    language_id: &str,
    input: Option<&Path>,
    overrides: &ResourceLimits,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let input = match input {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .context("failed to read input file")?,
        ),
        None => None,
    };

    // Pin command-line limits onto the requested profile
    let profile = config
        .get_language(language_id)
        .context("unknown language")?;
    let mut pinned = profile.clone();
    pinned.limits = Some(config.effective_limits(profile).with_overrides(overrides));
    let config = config.with_language(language_id.trim(), pinned);

    let orchestrator = Orchestrator::docker(config).context("failed to create docker client")?;
    let mut request = ExecutionRequest::new(language_id, code);
    request.input = input;

    info!(language = language_id, "running program");
    let result = orchestrator.execute(&request).await;

    if let Some(output) = &result.output {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(output.as_bytes())
            .and_then(|()| stdout.flush())
            .context("failed to write output")?;
    }
    if let Some(error) = &result.error {
        eprintln!("{error}");
    }

    info!(
        exit_code = result.exit_code,
        failure = ?result.failure,
        time = format_args!("{}ms", result.execution_time_ms),
        "execution result"
    );

    if result.is_success() {
        Ok(())
    } else {
        let code = i32::try_from(result.exit_code)
            .ok()
            .filter(|code| *code > 0)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for id in config.language_ids() {
        let Some(profile) = config.languages.get(id) else {
            continue;
        };
        let aliases = if profile.aliases.is_empty() {
            String::new()
        } else {
            format!(" [{}]", profile.aliases.join(", "))
        };
        println!("  {:<15} {} ({}){}", id, profile.name, profile.image, aliases);
    }
}

fn show_config(config: &Config) {
    let limits = &config.default_limits;
    println!("Default resource limits:");
    println!("  Memory: {:?} MiB", limits.memory_mb);
    println!("  CPUs: {:?}", limits.cpus);
    println!("  Timeout: {:?}s", limits.deadline().as_secs_f64());
    println!("  Max processes: {:?}", limits.pids_limit);
    println!("  Max output: {:?} KB", limits.max_output_kb);
    println!();
    match &config.docker_socket {
        Some(path) => println!("Docker socket: {}", path.display()),
        None => println!("Docker socket: local defaults"),
    }
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn pull_images(config: &Config, languages: &[String]) -> Result<()> {
    let images: BTreeSet<&str> = if languages.is_empty() {
        config
            .languages
            .values()
            .map(|profile| profile.image.as_str())
            .collect()
    } else {
        languages
            .iter()
            .map(|id| config.get_language(id).map(|profile| profile.image.as_str()))
            .collect::<Result<_, _>>()
            .context("unknown language")?
    };

    let docker = DockerRuntime::connect(config.docker_socket.as_deref())
        .context("failed to create docker client")?;
    for image in images {
        println!("Pulling {image}");
        docker
            .pull_image(image)
            .await
            .with_context(|| format!("failed to pull {image}"))?;
    }
    Ok(())
}

async fn prune(config: &Config) -> Result<()> {
    let docker = DockerRuntime::connect(config.docker_socket.as_deref())
        .context("failed to create docker client")?;
    let removed = docker.prune().await.context("failed to prune containers")?;
    println!("Removed {removed} container(s)");
    Ok(())
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}

//! brno-ci - run the hello-brno pipeline locally
//!
//! ## Commands
//!
//! - `build`: compile the application, optionally for another platform
//! - `test`: run `go test`
//! - `lint`: run golangci-lint
//! - `ci`: run build, test and lint concurrently
//! - `serve`: build the application and run it as a service on port 8080

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use brno_ci::{
    Ci, Container, ContainerEngine, DockerEngine, Platform, Step, DEFAULT_LINTER_VERSION,
    DEFAULT_REF, DEFAULT_VERSION,
};

#[derive(Parser)]
#[command(name = "brno-ci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, test and lint hello-brno in containers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Local source directory (takes precedence over --ref)
    #[arg(long, global = true, env = "BRNO_CI_SOURCE")]
    source: Option<PathBuf>,

    /// Ref of the demo repository to check out when no source is given
    #[arg(long = "ref", global = true, env = "BRNO_CI_REF", default_value = DEFAULT_REF)]
    git_ref: String,

    /// Docker CLI used as the container engine
    #[arg(long, global = true, env = "BRNO_CI_DOCKER", default_value = "docker")]
    docker: String,

    /// Fail a step that runs longer than this many seconds (0 = no limit)
    #[arg(long, global = true, env = "BRNO_CI_TIMEOUT_SECS", default_value = "0")]
    timeout_secs: u64,

    /// Print the container recipes as JSON instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the application
    Build {
        /// Target platform as os/arch[/variant] (default: engine host)
        #[arg(long)]
        platform: Option<Platform>,

        /// Version stamped into the binary
        #[arg(long = "version", default_value = DEFAULT_VERSION)]
        app_version: String,
    },

    /// Run the test suite
    Test,

    /// Lint with golangci-lint
    Lint {
        /// golangci-lint release to install
        #[arg(long, default_value = DEFAULT_LINTER_VERSION)]
        linter_version: String,
    },

    /// Run build, test and lint concurrently
    Ci,

    /// Run the application as a service until interrupted
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    brno_ci::init_tracing(cli.json, level);

    let mut docker = DockerEngine::new(&cli.docker);
    if cli.timeout_secs > 0 {
        docker = docker.with_timeout(Duration::from_secs(cli.timeout_secs));
    }
    let engine: Arc<dyn ContainerEngine> = Arc::new(docker);

    let ci = Ci::new(engine, cli.source.clone(), &cli.git_ref)
        .await
        .context("Failed to initialize CI")?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Commands::Build {
            platform,
            app_version,
        } => {
            let ctr = ci.build(platform.as_ref(), &app_version);
            cmd_step(&ci, ctr, cli.dry_run, &cancel).await
        }
        Commands::Test => cmd_step(&ci, ci.test(), cli.dry_run, &cancel).await,
        Commands::Lint { linter_version } => {
            cmd_step(&ci, ci.lint(&linter_version), cli.dry_run, &cancel).await
        }
        Commands::Ci => cmd_ci(&ci, cli.dry_run, cancel).await,
        Commands::Serve => cmd_serve(&ci, cli.dry_run, cancel).await,
    }
}

/// Cancel `cancel` on the first Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

/// Run one step, or print its recipe.
async fn cmd_step(
    ci: &Ci,
    ctr: Container,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    if dry_run {
        println!("{}", serde_json::to_string_pretty(&ctr)?);
        return Ok(());
    }

    let output = ci
        .sync(&ctr, cancel)
        .await
        .with_context(|| format!("Step '{}' failed", ctr.name))?;

    print!("{}", output.stdout);
    println!("Step '{}' passed in {} ms", output.step, output.duration_ms);
    Ok(())
}

async fn cmd_ci(ci: &Ci, dry_run: bool, cancel: CancellationToken) -> Result<()> {
    if dry_run {
        let steps: Vec<Container> = Step::PIPELINE.iter().map(|step| ci.recipe(*step)).collect();
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    ci.ci(cancel).await.context("CI pipeline failed")?;
    println!("CI pipeline passed");
    Ok(())
}

async fn cmd_serve(ci: &Ci, dry_run: bool, cancel: CancellationToken) -> Result<()> {
    if dry_run {
        println!("{}", serde_json::to_string_pretty(&ci.service())?);
        return Ok(());
    }

    let service = ci.as_service().await.context("Failed to start service")?;
    match service.endpoint() {
        Some(endpoint) => println!("Serving at {endpoint} (Ctrl-C to stop)"),
        None => println!("Service {} started (Ctrl-C to stop)", service.id),
    }

    cancel.cancelled().await;

    info!(id = %service.id, "stopping service");
    ci.stop_service(&service)
        .await
        .context("Failed to stop service")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_defaults() {
        let cli = Cli::try_parse_from(["brno-ci", "build"]).unwrap();
        assert_eq!(cli.git_ref, "main");
        assert!(cli.source.is_none());
        match cli.command {
            Commands::Build {
                platform,
                app_version,
            } => {
                assert!(platform.is_none());
                assert_eq!(app_version, "dev");
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_build_platform_and_version() {
        let cli = Cli::try_parse_from([
            "brno-ci",
            "build",
            "--platform",
            "linux/arm/v7",
            "--version",
            "v1.0.0",
        ])
        .unwrap();
        match cli.command {
            Commands::Build {
                platform,
                app_version,
            } => {
                let platform = platform.unwrap();
                assert_eq!(platform.arch, "arm");
                assert_eq!(platform.variant.as_deref(), Some("v7"));
                assert_eq!(app_version, "v1.0.0");
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_invalid_platform_rejected() {
        assert!(Cli::try_parse_from(["brno-ci", "build", "--platform", "linux"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "brno-ci",
            "ci",
            "--source",
            "/tmp/app",
            "--ref",
            "feature",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.source, Some(PathBuf::from("/tmp/app")));
        assert_eq!(cli.git_ref, "feature");
        assert!(cli.dry_run);
        assert!(matches!(cli.command, Commands::Ci));
    }

    #[test]
    fn test_lint_default_version() {
        let cli = Cli::try_parse_from(["brno-ci", "lint"]).unwrap();
        match cli.command {
            Commands::Lint { linter_version } => assert_eq!(linter_version, "v1.59.0"),
            _ => panic!("expected lint"),
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use hello_brno::{BuildInfo, LISTEN_ADDR};

#[derive(Parser)]
#[command(name = "hello-brno", about = "Hello Brno demo server", disable_version_flag = true)]
struct Cli {
    /// Prints version info
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_from(hello_brno::normalize_args(std::env::args_os()));
    let info = BuildInfo::current();

    if cli.version {
        print!("{}", info.banner());
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(version = %info.version, date = %info.date, "starting server");

    let listener = TcpListener::bind(LISTEN_ADDR)
        .await
        .with_context(|| format!("Failed to bind to {LISTEN_ADDR}"))?;

    hello_brno::serve(listener, info, shutdown_signal()).await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

//! Serve uploads and generated images for the agent image tool.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use nb_image_service::{ServiceDirs, router};

#[derive(Debug, Parser)]
#[command(name = "nb-image-service", about = "Upload and static image service")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "NB_IMAGE_SERVICE_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,
    /// Directory uploaded images are stored in.
    #[arg(long, env = "NB_IMAGE_SERVICE_INPUT_DIR", default_value = "nano-banana-agent/input")]
    input_dir: PathBuf,
    /// Directory generated images are served from under `/images`.
    #[arg(long, env = "NB_IMAGE_SERVICE_RESULT_DIR", default_value = "nano-banana-agent/result")]
    result_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let dirs = ServiceDirs::prepare(&args.input_dir, &args.result_dir)
        .context("failed to prepare service directories")?;
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    info!(
        event = "server.started",
        address = %args.bind,
        input_dir = %dirs.input_dir.display(),
        result_dir = %dirs.result_dir.display(),
        "image service started"
    );
    axum::serve(listener, router(&dirs))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;
    Ok(())
}

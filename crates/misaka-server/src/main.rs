//! `misaka-server` - standalone RESP listener over the embedded storage
//! engine in `misaka-core`.

use clap::Parser;
use misaka_core::{Engine, MisakaConfig};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Standalone server for the embedded Bitcask-style key-value store.
#[derive(Parser, Debug)]
#[command(name = "misaka-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding every category's segment files.
    #[arg(short, long, env = "MISAKA_STORAGE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Address to bind the RESP listener to.
    #[arg(short, long, env = "MISAKA_SERVER_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Optional TOML config file, merged between defaults and environment.
    #[arg(short, long, env = "MISAKA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = MisakaConfig::load(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(listen_addr) = args.listen_addr {
        config.server.listen_addr = listen_addr;
    }

    tracing::info!(data_dir = %config.storage.data_dir.display(), "opening engine");
    let engine = Engine::open(&config)?;

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    tracing::info!(addr = %config.server.listen_addr, "misaka-server listening");

    misaka_server::serve(listener, engine).await?;
    Ok(())
}

//! orbit-relay binary entry point.
//!
//! Usage:
//! ```bash
//! orbit-relay --config relay.toml
//! orbit-relay --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use orbit_relay::config::Config;
use orbit_relay::http::{self, health};
use orbit_relay::server::OrbitRelay;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Realtime device-to-device transfer relay.
#[derive(Parser, Debug)]
#[command(name = "orbit-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (defaults to ./relay.toml if present)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_tracing(&config.logging.level);

    tracing::info!("orbit-relay v{} starting", env!("CARGO_PKG_VERSION"));
    health::init_start_time();

    let relay = Arc::new(OrbitRelay::new(config));
    http::serve(relay).await.context("relay server failed")?;

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let default_path = Path::new("relay.toml");
            if default_path.exists() {
                Config::from_file(default_path).context("failed to load relay.toml")
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// RUST_LOG wins over the configured level.
fn init_tracing(level: &str) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(level),
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
}

//! Bubble Life - Entry Point
//!
//! Runs one headless session against a logging transport for a fixed time,
//! reporting the population as it evolves, then shuts it down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use bubble_life::core::config::SimulationConfig;
use bubble_life::simulation::{Activity, LogTransport, Session};

#[derive(Debug, Parser)]
#[command(name = "bubble-life", about = "Headless bubble grid simulation")]
struct Args {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,

    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 10)]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bubble_life=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        SimulationConfig::load_from_toml(&args.config)?
    } else {
        tracing::warn!(path = %args.config.display(), "config not found - using defaults");
        SimulationConfig::default()
    };
    if let Some(seed) = args.seed {
        config.grid.seed = Some(seed);
    }

    let activity = Arc::new(Activity::new());
    let session = Session::new(Arc::new(config), LogTransport, activity.clone());
    session.start().await?;

    let mut report = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = report.tick() => {
                tracing::info!(
                    total = session.total_bubbles(),
                    population = ?session.population(),
                    last_activity = ?activity.last(),
                    "population"
                );
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    session.shutdown();
    session.join().await;
    tracing::info!(dropped = session.dropped_snapshots(), "done");
    Ok(())
}

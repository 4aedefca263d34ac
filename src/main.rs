use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use floodgate::config::FloodgateConfig;
use floodgate::ratelimit::Limiter;

/// Exercise the Floodgate limiters from the command line.
#[derive(Debug, Parser)]
#[command(name = "floodgate", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Block on a leaky bucket and report the wait between admissions
    Leaky {
        #[arg(long, default_value_t = 10)]
        requests: usize,
    },
    /// Poll a token bucket at a fixed spacing and report each decision
    Token {
        #[arg(long, default_value_t = 20)]
        requests: usize,
        #[arg(long, default_value_t = 500)]
        spacing_ms: u64,
    },
    /// Dispatch work through a fixed-window throttle
    Throttle {
        #[arg(long, default_value_t = 10)]
        requests: usize,
    },
    /// Block on a pacer and report the gap between admissions
    Pacer {
        #[arg(long, default_value_t = 10)]
        requests: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!("Starting Floodgate demo");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = FloodgateConfig::load(cli.config.as_deref())?;
    info!(config = ?config, "Configuration loaded");

    match cli.command {
        Command::Leaky { requests } => {
            let bucket = config.leaky_bucket.build()?;
            tokio::task::spawn_blocking(move || {
                let mut prev = Instant::now();
                for i in 0..requests {
                    let now = bucket.take();
                    info!(request = i, waited = ?now.duration_since(prev), "Leaky bucket admitted");
                    prev = now;
                }
            })
            .await?;
        }
        Command::Token { requests, spacing_ms } => {
            let bucket = config.token_bucket.build()?;
            for i in 0..requests {
                let allowed = bucket.allow(1.0);
                info!(request = i + 1, allowed, "Token bucket decision");
                tokio::time::sleep(Duration::from_millis(spacing_ms)).await;
            }
        }
        Command::Throttle { requests } => {
            let executed = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&executed);
            let throttle = config.throttle.build(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })?;

            let start = Instant::now();
            for _ in 0..requests {
                throttle.handle().await?;
            }
            throttle.cancel();

            // Let the last dispatched tasks run before reporting
            tokio::time::sleep(throttle.period()).await;
            info!(
                requests,
                executed = executed.load(Ordering::SeqCst),
                elapsed = ?start.elapsed(),
                "Throttled queries finished"
            );
        }
        Command::Pacer { requests } => {
            let pacer = config.pacer.build()?;
            tokio::task::spawn_blocking(move || {
                let mut prev = Instant::now();
                for i in 0..requests {
                    let now = pacer.take();
                    info!(request = i, gap = ?now.duration_since(prev), "Pacer admitted");
                    prev = now;
                }
            })
            .await?;
        }
    }

    info!("Floodgate demo finished");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

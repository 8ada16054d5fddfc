use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use patchwatch_limit::RateLimiter;
use patchwatch_server::ServerConfig;
use patchwatch_source::{ClairApiV1, ClairStream};

/// Serve Clair advisories to patchwatch agents as resumable jobs.
#[derive(Debug, Parser)]
#[command(name = "patchwatch-server", version, about)]
struct Args {
    /// Port to bind the advisory API to.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Base URL of the Clair v1 API.
    #[arg(long, default_value = "http://127.0.0.1:6060")]
    clair: String,

    /// Maximum number of advisory jobs served concurrently.
    #[arg(long, default_value_t = 128)]
    max_jobs: usize,

    /// Pause between upstream Clair requests, in milliseconds.
    #[arg(long, default_value_t = 100)]
    rate_limit: u64,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let limiter = RateLimiter::new(Duration::from_millis(args.rate_limit));
    let source = ClairStream::new(
        ClairApiV1 {
            base_url: args.clair.clone(),
        },
        limiter,
    )
    .context("failed to build Clair client")?;

    let listen_addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    patchwatch_server::start_server(
        ServerConfig {
            listen_addr,
            max_jobs: args.max_jobs,
        },
        Arc::new(source),
    )
    .await
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use patchwatch_agent::{Agent, Reporter};
use patchwatch_client::AdvisoryClient;
use patchwatch_limit::RateLimiter;
use patchwatch_types::{Platform, VersionMatch};

/// Scan this host for unpatched packages and report findings.
#[derive(Debug, Parser)]
#[command(name = "patchwatch-agent", version, about, after_help = supported_platforms())]
struct Args {
    /// Platform this host runs, e.g. debian-8.
    #[arg(long)]
    platform: String,

    /// Base URL of the patchwatch server to pull advisories from.
    #[arg(long)]
    server: String,

    /// URL of the collector endpoint findings are sent to.
    #[arg(long)]
    collector: String,

    /// Minutes between scan cycles.
    #[arg(long, default_value_t = 720)]
    scan_frequency: u64,

    /// Pause between advisory polls, in milliseconds.
    #[arg(long, default_value_t = 200)]
    rate_limit: u64,

    /// Seconds between report batches.
    #[arg(long, default_value_t = 5)]
    send_every: u64,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let Some(platform) = Platform::from_external_name(&args.platform) else {
        bail!(
            "unsupported platform '{}'\n{}",
            args.platform,
            supported_platforms()
        );
    };

    let limiter = RateLimiter::new(Duration::from_millis(args.rate_limit));
    let client =
        AdvisoryClient::new(&args.server, limiter).context("failed to build advisory client")?;

    let scanner = patchwatch_scan::for_platform(platform, VersionMatch::Prefix);

    let (reporter, reporter_errors) =
        Reporter::spawn(&args.collector, Duration::from_secs(args.send_every))
            .context("failed to build reporter")?;

    let agent = Agent {
        source: Arc::new(client),
        platform,
        scan_frequency: Duration::from_secs(args.scan_frequency * 60),
        scanner: Arc::from(scanner),
        reporter,
        reporter_errors,
    };

    agent.run().await?;
    Ok(())
}

fn supported_platforms() -> String {
    format!(
        "Supported platforms: {}",
        Platform::supported_names().join(", ")
    )
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

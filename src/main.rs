//! Mycelium main entry point
//!
//! This is the command-line interface for the Mycelium crawl engine.

use anyhow::Context;
use clap::Parser;
use mycelium::config::{load_config, Config, PopModeConfig, StoreBackend};
use mycelium::crawler::{crawl, load_filter, load_identity, load_seeds};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Mycelium: the crawl engine of a content-discovery pipeline
///
/// Mycelium pops URLs from a shared frontier, fetches them with rotated
/// user agents and proxies, extracts structured page content and forwards
/// it downstream or persists it and follows its links.
#[derive(Parser, Debug)]
#[command(name = "mycelium")]
#[command(version)]
#[command(about = "A distributed crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and input files and show what would run without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_crawl(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("mycelium=info,warn"),
            1 => EnvFilter::new("mycelium=debug,info"),
            2 => EnvFilter::new("mycelium=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and inputs, shows what would run
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let seeds = load_seeds(&config.inputs).context("Failed to load seed file")?;
    let identity = load_identity(&config.inputs).context("Failed to load identity options")?;
    let filter = load_filter(&config.inputs).context("Failed to load blacklist file")?;

    println!("=== Mycelium Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Request timeout: {}ms", config.crawler.request_timeout_ms);
    println!("  Max body bytes: {}", config.crawler.max_body_bytes);
    match config.crawler.fetch_retry() {
        Some(backoff) => println!("  Fetch retry: enabled ({:?} backoff)", backoff),
        None => println!("  Fetch retry: disabled"),
    }
    println!(
        "  Rotators: {}",
        if config.crawler.shared_rotators {
            "shared"
        } else {
            "per worker"
        }
    );

    println!("\nFrontier:");
    match config.frontier.pop_mode {
        PopModeConfig::Bounded => println!("  Pop: bounded ({}ms)", config.frontier.pop_timeout_ms),
        PopModeConfig::Blocking => println!("  Pop: blocking"),
    }
    match &config.idle {
        Some(idle) => println!(
            "  Idle exit: after {} empty polls, {}ms apart",
            idle.max_idle, idle.interval_ms
        ),
        None => println!("  Idle exit: never (service mode)"),
    }

    println!("\nStore:");
    match config.store.backend {
        StoreBackend::Memory => println!("  Backend: memory"),
        StoreBackend::Sqlite => println!(
            "  Backend: sqlite ({})",
            config.store.path.as_deref().unwrap_or("")
        ),
        StoreBackend::Redis => println!("  Backend: redis"),
    }
    println!("  Frontier key: {}", config.store.frontier_key);
    if config.store.handoff {
        println!("  Pages: handed off to '{}'", config.store.handoff_key);
    } else {
        println!(
            "  Pages: persisted under {}",
            config.store.output_dir.as_deref().unwrap_or("")
        );
    }
    if config.store.ingress {
        println!("  Ingress: draining '{}'", config.store.ingress_key);
    }

    println!("\nInputs:");
    println!(
        "  User agents: {}",
        identity
            .user_agents
            .as_ref()
            .map_or(0, |c| c.options().len())
    );
    println!(
        "  Proxies: {}",
        identity.proxies.as_ref().map_or(0, |c| c.options().len())
    );
    println!("  Filtered domains: {}", filter.len());

    println!("\nSeed URLs ({}):", seeds.len());
    for seed in &seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start {} workers with {} seed URLs",
        config.crawler.workers,
        seeds.len()
    );

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    tracing::info!(
        "Starting crawl with {} workers, max retries {}",
        config.crawler.workers,
        config.crawler.max_retries
    );

    match crawl(config, cancel).await {
        Ok(stats) => {
            tracing::info!("Crawl completed successfully: {}", stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e).context("Crawl failed")
        }
    }
}

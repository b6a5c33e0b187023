//! metarouter - Adaptive Provider Router CLI
//!
//! Host binary for the router core. Loads configuration, initializes logging
//! and exposes the router's operations as subcommands. Results are printed to
//! stdout as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Route a single query
//! metarouter query "What is the capital of France?"
//!
//! # Ask for a specific provider with conversation context
//! metarouter query --provider claude-3 --context "Answer in one word." "Capital of France?"
//!
//! # Route one query per stdin line, then print performance metrics
//! cat questions.txt | metarouter batch
//!
//! # Profiles plus the last 10 minutes of attempts
//! metarouter metrics --window-mins 10
//!
//! # Probe every provider and print the health report
//! metarouter health --probe
//!
//! # Verbose logging
//! RUST_LOG=debug metarouter query "hello"
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use router_core::routing::RECENT_WINDOW;
use router_core::{load_config, load_config_from_path, MetaRouter, QueryRequest, RouterConfig};

/// metarouter - Route queries across inference providers
#[derive(Parser, Debug)]
#[command(name = "metarouter")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "METAROUTER_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "METAROUTER_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route one query and print the response
    Query {
        /// Query text
        text: String,

        #[command(flatten)]
        options: QueryOptions,
    },

    /// Route one query per line of stdin, then print metrics
    Batch {
        #[command(flatten)]
        options: QueryOptions,
    },

    /// Print per-provider performance profiles and recent-window stats
    Metrics {
        /// Recent window in minutes
        #[arg(long, default_value_t = 60)]
        window_mins: u64,
    },

    /// Print provider availability
    Health {
        /// Send a probe to every provider first
        #[arg(long)]
        probe: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct QueryOptions {
    /// Conversation context sent as the system prompt
    #[arg(long)]
    context: Option<String>,

    /// Preferred provider key
    #[arg(short = 'p', long)]
    provider: Option<String>,

    /// Maximum tokens in the response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl QueryOptions {
    fn request(&self, text: impl Into<String>) -> QueryRequest {
        QueryRequest {
            query: text.into(),
            context: self.context.clone(),
            preferred_provider: self.provider.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Initialize logging to stderr with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("router_core={level},metarouter={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<PathBuf>) -> Result<RouterConfig> {
    match path {
        Some(path) => load_config_from_path(Some(path.clone()))
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => load_config().context("Failed to load config"),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

async fn run_batch(router: Arc<MetaRouter>, options: &QueryOptions) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut routed = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping batch");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match router.route(&options.request(line)).await {
            Ok(response) => {
                let rendered =
                    serde_json::to_string(&response).context("Failed to serialize response")?;
                println!("{rendered}");
            }
            Err(e) => {
                warn!(error = %e, "Query failed");
                println!("{}", json!({ "error": e.to_string(), "attempted": e.attempted_providers() }));
            }
        }
        routed += 1;
    }

    info!(routed, "Batch complete");
    print_json(&json!({
        "performance": router.performance_metrics(),
        "recent": router.recent_metrics(RECENT_WINDOW),
        "router": router.router_metrics(),
        "rankings": router.rankings(),
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = load(args.config)?;
    info!(source = %config.source, providers = config.providers.len(), "Configuration loaded");

    let router = Arc::new(MetaRouter::from_config(&config).context("Failed to build router")?);

    match args.command {
        Command::Query { text, options } => {
            let response = router
                .route(&options.request(text))
                .await
                .context("Routing failed")?;
            print_json(&response)
        }
        Command::Batch { options } => {
            let checker = router.spawn_health_checker(config.health_check_interval());
            let result = run_batch(Arc::clone(&router), &options).await;
            if let Some(handle) = checker {
                handle.abort();
            }
            result
        }
        Command::Metrics { window_mins } => print_json(&json!({
            "performance": router.performance_metrics(),
            "recent": router.recent_metrics(Duration::from_secs(window_mins.saturating_mul(60))),
        })),
        Command::Health { probe } => {
            if probe {
                let results = router.probe_providers().await;
                info!(
                    healthy = results.iter().filter(|r| r.healthy).count(),
                    total = results.len(),
                    "Probes complete"
                );
            }
            print_json(&router.health_status())
        }
    }
}

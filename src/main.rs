//! Expectation Mock Server - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use expectation_mock_server::config::{parse_listen_addr, SAMPLE_CONFIG};
use expectation_mock_server::{AppState, MockServer, MockServerConfig, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "expectation-mock-server",
    about = "HTTP mock server - register expectations, serve stub responses, inspect request history",
    version
)]
struct Args {
    /// Listen address (":8081" binds all interfaces)
    #[arg(short, long, env = "SERVER_ADDR_HTTP", default_value = ":8081")]
    addr: String,

    /// Expectations file (.json, .yaml or .yml)
    #[arg(short = 'f', long, env = "EXPECTATIONS_FILE")]
    expectations_file: Option<PathBuf>,

    /// Inline expectations as a JSON array
    #[arg(short = 'j', long, env = "EXPECTATIONS_CONFIG_JSON")]
    expectations_json: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print a sample expectations file and exit
    #[arg(long)]
    print_config: bool,

    /// Validate expectations and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", SAMPLE_CONFIG);
        return Ok(());
    }

    let config = load_config(&args)?;

    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} expectations defined)",
            config.expectations.len()
        );
        return Ok(());
    }

    let store = Arc::new(Store::with_history_limit(config.settings.history_limit));
    store
        .add_expectations(config.expectations)
        .context("loading startup expectations")?;

    let addr = parse_listen_addr(&args.addr)?;
    let state = AppState::new(store, config.settings).context("registering page templates")?;
    let server = MockServer::bind(addr, state)
        .await
        .with_context(|| format!("binding {addr}"))?;

    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}

/// Merge the expectations file and inline JSON, file first.
fn load_config(args: &Args) -> Result<MockServerConfig> {
    let mut config = MockServerConfig::default();

    if let Some(path) = &args.expectations_file {
        info!(path = %path.display(), "Loading expectations file");
        config = MockServerConfig::from_file(path)?;
    }

    if let Some(json) = args.expectations_json.as_deref().filter(|j| !j.trim().is_empty()) {
        info!("Loading inline expectations");
        let inline = MockServerConfig::from_json(json).context("parsing inline expectations")?;
        config.merge(inline);
    }

    if config.expectations.is_empty() {
        info!("No startup expectations (register them via POST /api/expectation)");
    }

    Ok(config)
}

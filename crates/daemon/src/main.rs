//! ferryd - message routing daemon
//!
//! Wires the stock stdio plugins to the routing engine: stdin lines become
//! packs, packs matching `ident == "stdin"` are printed to stdout.
//!
//! # Usage
//!
//! ```bash
//! ferryd
//! ferryd --config configs/ferry.toml
//! tail -f /var/log/syslog | ferryd --log-level debug
//! ```

mod stdio;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ferry_config::{Config, LogFormat};
use ferry_engine::{Matcher, MessageRouter, PackPool, RunnerState};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// ferryd - message routing daemon
#[derive(Parser, Debug)]
#[command(name = "ferryd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/ferry.toml")]
    config: std::path::PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("loading config {}", cli.config.display()))?
    } else {
        Config::default()
    };

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or_else(|| config.log.level.as_str());
    init_logging(level, config.log.format)?;

    if !cli.config.exists() {
        tracing::info!(config = %cli.config.display(), "config file not found, using defaults");
    }
    tracing::info!(
        pool = config.engine.pool_capacity,
        hub = config.engine.hub_capacity,
        "ferryd starting"
    );

    let engine = config.engine.clone();
    let pool = PackPool::new(engine.pool_capacity);
    let mut router = MessageRouter::new(engine.clone());

    // Stock stdout output: prints every pack produced by the stdin input
    let stdout_runner = RunnerState::new("stdout");
    let (stdout_matcher, stdout_rx) = Matcher::new(
        Arc::clone(&stdout_runner) as Arc<dyn ferry_engine::DestinationRunner>,
        engine.plugin_channel_capacity,
        |data| data.ident == stdio::STDIN_IDENT,
    );
    router.add_output_matcher(Arc::clone(&stdout_matcher));

    let handle = router.handle();
    let router_task = tokio::spawn(router.start());
    let output_task = tokio::spawn(stdio::run_stdout_output(stdout_rx, stdout_runner));
    let mut input_task = tokio::spawn(stdio::run_stdin_input(pool.clone(), handle.clone()));

    // Run until interrupted or stdin closes
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for shutdown signal")?;
            tracing::info!("shutdown signal received");
            input_task.abort();
        }
        _ = &mut input_task => {}
    }

    // Teardown order matters: close the output's channel so it drains and
    // stops, then stop() can observe every runner stopped and cancel the
    // router loop.
    handle.remove_output_matcher(&stdout_matcher).await?;
    handle.stop().await;

    let _ = output_task.await;
    router_task.await.context("router task panicked")?;

    let s = handle.stats();
    tracing::info!(
        msgs = s.total_processed_msgs,
        bytes = s.total_processed_bytes,
        unmatched = s.unmatched,
        "ferryd stopped"
    );
    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    match format {
        LogFormat::Console => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_thread_ids(false))
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
    }

    Ok(())
}

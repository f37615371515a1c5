//! resilient-flow
//!
//! Paced consumption of an item source and resilient calls to an upstream
//! dependency, served over HTTP.
//!
//! ```text
//!     Client Request        ┌──────────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ correlation ─▶ handler ─▶ demand controller    │
//!                           │   middleware        │        (batch, pause)      │
//!                           │                     ▼                            │
//!                           │              resilient client                    │
//!                           │   breaker gate ─▶ timeout ─▶ classify ─▶ retry   │
//!                           │                     │                            │
//!     Client Response       │                     ▼                            │
//!     ◀─────────────────────┼── response mapping ◀── upstream ◀────────────────┼──── Upstream
//!                           └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use resilient_flow::config::{DemandConfig, LogFormat, ObservabilityConfig};
use resilient_flow::flow::{DemandController, IterSource};
use resilient_flow::lifecycle::serve_from_file;
use resilient_flow::observability::logging;

#[derive(Parser)]
#[command(name = "resilient-flow")]
#[command(about = "Paced consumer and resilient upstream client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        #[arg(short, long, default_value = "resilient-flow.toml")]
        config: PathBuf,
    },
    /// Consume a local sequence in paced batches, logging each item
    Pace {
        #[arg(long, default_value_t = 5)]
        items: u32,
        #[arg(long, default_value_t = 2)]
        batch_size: u32,
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,
    },
    /// Query the health endpoint of a running service
    Health {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve_from_file(&config).await?,
        Commands::Pace {
            items,
            batch_size,
            delay_ms,
        } => pace(items, batch_size, delay_ms).await?,
        Commands::Health { url } => health(&url).await?,
    }

    Ok(())
}

async fn pace(items: u32, batch_size: u32, delay_ms: u64) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&ObservabilityConfig {
        log_format: LogFormat::Pretty,
        ..ObservabilityConfig::default()
    });

    let controller = DemandController::new(&DemandConfig {
        batch_size,
        inter_batch_delay_ms: delay_ms,
    });
    tracing::info!(
        items,
        batch_size = controller.batch_size(),
        delay = ?Duration::from_millis(delay_ms),
        "Pacing local sequence"
    );

    let report = controller
        .run_to_end(IterSource::from_items(1..=items), |item| async move {
            tracing::info!(item, "Item received");
        })
        .await?;

    tracing::info!(
        delivered = report.delivered,
        batches = report.batches,
        "Sequence finished"
    );
    Ok(())
}

async fn health(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let res = reqwest::get(format!("{}/health", url.trim_end_matches('/'))).await?;
    let status = res.status();
    let body: serde_json::Value = res.json().await?;

    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

//! Corebank Simulator
//!
//! Load driver that runs concurrent scenarios against an in-memory ledger
//! and checks that every account still reconciles afterwards.

use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod scenario;

use corebank_common::parse_amount;
use corebank_ledger::{LedgerConfig, LedgerService};

use controller::SimulationController;
use scenario::Scenario;

/// Corebank Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Concurrent load simulation for the corebank ledger")]
struct Args {
    /// Number of accounts to open
    #[arg(short, long, default_value = "10")]
    accounts: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Total operations to issue
    #[arg(short, long, default_value = "1000")]
    operations: usize,

    /// Scenario to run (deposits, transfers, mixed)
    #[arg(short, long, default_value = "mixed")]
    scenario: String,

    /// Opening balance of every account
    #[arg(long, default_value = "1000.00")]
    initial_balance: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = LedgerConfig::from_env();

    // Initialize logging
    let json = args.json_logs;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!("Starting Corebank Simulator");

    let initial_balance: Decimal = parse_amount(&args.initial_balance)?;
    let scenario = Scenario::load(&args.scenario)?;

    let ledger = LedgerService::builder(config)
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let mut controller = SimulationController::new(ledger, args.seed);
    controller.initialize(args.accounts, initial_balance).await?;
    controller
        .run_scenario(&scenario, args.workers, args.operations)
        .await?;

    let report = controller.report(&scenario).await?;
    info!(
        total = report.metrics.total_operations,
        committed = report.metrics.successful_operations,
        rejected = report.metrics.rejected_operations,
        success_rate = report.metrics.success_rate(),
        avg_latency_us = report.metrics.average_latency_us(),
        p99_latency_us = report.metrics.p99_latency_us(),
        "Simulation complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_consistent(&scenario) {
        error!(
            unbalanced = report.unbalanced_accounts.len(),
            "Ledger invariants violated"
        );
        return Err(anyhow::anyhow!("Ledger invariants violated"));
    }

    Ok(())
}

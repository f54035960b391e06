// ==============================================================================
// main.rs - cg Command Line Entry Point
// ==============================================================================
// Description: Operator CLI for the status database, orders, compression
//              and uploads
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cg_core::bundle::MipAnalysis;
use cg_core::metrics::MetricsDeliverables;
use cg_core::store::Store;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cg_core=info,cg=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Cli::parse();

    if !args.command.needs_database() {
        return run_local(args.command);
    }

    let config = args.config.into_config()?;
    let store = Store::connect(&config.database_url)
        .await
        .context("Failed to connect to the status database")?;
    info!("Connected to status database");

    let actor = cli::actor();

    match args.command {
        Commands::Migrate => {
            store.migrate().await?;
            info!("Migrations applied");
        }
        Commands::Add(command) => cli::add::run(&store, command, &actor).await?,
        Commands::Set(command) => cli::set::run(&store, command, &actor).await?,
        Commands::Status(command) => cli::status::run(&store, command).await?,
        Commands::Compress(command) => cli::compress::compress(&store, &config, command, &actor).await?,
        Commands::Clean(command) => cli::compress::clean(&store, &config, command).await?,
        Commands::Decompress(command) => cli::compress::decompress(&store, &config, command, &actor).await?,
        Commands::Upload(command) => cli::upload::run(&store, &config, command, &actor).await?,
        Commands::Orders(cli::orders::OrdersCommand::Validate { order_type, file }) => {
            cli::orders::validate(order_type, &file)?
        }
        Commands::Orders(cli::orders::OrdersCommand::Submit { order_type, file }) => {
            cli::orders::submit(&store, order_type, &file, &actor).await?
        }
        Commands::Transfer(command) => cli::transfer::run(&store, &config, command).await?,
        // handled before connecting
        Commands::Metrics { .. } | Commands::Bundle { .. } => {}
    }

    Ok(())
}

/// Commands that only read local files
fn run_local(command: Commands) -> Result<()> {
    match command {
        Commands::Metrics { deliverables } => {
            let content = std::fs::read_to_string(&deliverables)
                .with_context(|| format!("Failed to read {}", deliverables.display()))?;
            let metrics = MetricsDeliverables::from_yaml(&content)?.sample_id_metrics()?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Commands::Bundle { config, sampleinfo } => {
            let analysis = MipAnalysis::from_files(&config, &sampleinfo)?;
            println!("{}", serde_json::to_string_pretty(&analysis.bundle)?);
        }
        other => anyhow::bail!("{:?} needs the status database", other),
    }
    Ok(())
}

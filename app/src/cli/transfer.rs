// ==============================================================================
// cli/transfer.rs - `cg transfer`
// ==============================================================================
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Subcommand;

use cg_core::config::CgConfig;
use cg_core::stats::{transfer_flowcell, StatsApi};
use cg_core::store::Store;

#[derive(Subcommand, Debug)]
pub enum TransferCommand {
    /// Populate reads and sequencing dates from the statistics database
    Flowcell {
        flowcell_name: String,
    },
}

pub async fn run(store: &Store, config: &CgConfig, command: TransferCommand) -> Result<()> {
    let TransferCommand::Flowcell { flowcell_name } = command;

    let url = config
        .cgstats_database_url
        .as_deref()
        .context("CGSTATS_DATABASE_URL must be set to transfer flowcells")?;
    let stats = StatsApi::connect(url, &config.cgstats_root).await?;

    let flowcell = transfer_flowcell(store, &stats, &flowcell_name).await?;
    println!("flowcell transferred: {} ({})", flowcell.name, flowcell.status);
    Ok(())
}

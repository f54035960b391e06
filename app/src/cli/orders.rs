// ==============================================================================
// cli/orders.rs - `cg orders`
// ==============================================================================
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::error;

use cg_core::orderform::{parse_order_file, OrderType, OrdersApi};
use cg_core::store::Store;

#[derive(Subcommand, Debug)]
pub enum OrdersCommand {
    /// Check an order without touching the database
    Validate {
        order_type: OrderType,
        /// Order portal JSON or orderform CSV export
        file: PathBuf,
    },

    /// Validate and store an order
    Submit {
        order_type: OrderType,
        file: PathBuf,
    },
}

pub fn validate(order_type: OrderType, file: &PathBuf) -> Result<()> {
    let order = parse_order_file(file).with_context(|| format!("Failed to read {}", file.display()))?;

    match order_type.validate(&order) {
        Ok(()) => {
            println!("order {} is valid: {} samples", order.name, order.samples.len());
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                error!("{}", e);
            }
            bail!("order {} has {} error(s)", order.name, errors.len());
        }
    }
}

pub async fn submit(store: &Store, order_type: OrderType, file: &PathBuf, actor: &str) -> Result<()> {
    let order = parse_order_file(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let result = OrdersApi::new(store).submit(order_type, &order, actor).await?;

    for case in &result.cases {
        println!("case: {} ({})", case.internal_id, case.name);
    }
    for sample in &result.samples {
        println!("sample: {} ({})", sample.internal_id, sample.name);
    }
    for pool in &result.pools {
        println!("pool: {} ({})", pool.name, pool.id);
    }
    Ok(())
}

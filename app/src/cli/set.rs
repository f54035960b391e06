// ==============================================================================
// cli/set.rs - `cg set`
// ==============================================================================
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::{error, info, warn};

use cg_core::audit::{log_event, AuditEventType};
use cg_core::constants::{CaseAction, DataDelivery, Pipeline, Priority};
use cg_core::store::{CaseUpdate, Store};

#[derive(Subcommand, Debug)]
pub enum SetCommand {
    /// Update information about a case
    Case {
        #[arg(short, long)]
        action: Option<CaseAction>,
        #[arg(long)]
        avatar_url: Option<String>,
        #[arg(short, long = "customer-id")]
        customer_id: Option<String>,
        #[arg(short, long)]
        data_analysis: Option<Pipeline>,
        #[arg(long, visible_alias = "dd")]
        data_delivery: Option<DataDelivery>,
        #[arg(short = 'g', long = "panel")]
        panels: Vec<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        case_id: String,
    },
}

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("NA")
}

pub async fn run(store: &Store, command: SetCommand, actor: &str) -> Result<()> {
    let SetCommand::Case {
        action,
        avatar_url,
        customer_id,
        data_analysis,
        data_delivery,
        panels,
        priority,
        case_id,
    } = command;

    let Some(case) = store.family(&case_id).await? else {
        error!("Can't find case {}", case_id);
        bail!("case not found: {}", case_id);
    };

    let mut update = CaseUpdate {
        action,
        data_analysis,
        data_delivery,
        priority,
        ..Default::default()
    };

    if let Some(url) = avatar_url {
        match store.find_family_by_avatar_url(&url).await? {
            Some(other) if other.id != case.id => {
                warn!("{} is already used by {}, keeping avatar", url, other.internal_id);
            }
            _ => update.avatar_url = Some(url),
        }
    }

    if let Some(customer_id) = &customer_id {
        let Some(customer) = store.customer(customer_id).await? else {
            error!("Unknown customer: {}", customer_id);
            bail!("customer not found: {}", customer_id);
        };
        update.customer_id = Some(customer.id);
    }

    if !panels.is_empty() {
        for panel in &panels {
            if store.panel(panel).await?.is_none() {
                error!("unknown gene panel: {}", panel);
                bail!("{}: panel not found", panel);
            }
        }
        update.panels = Some(panels);
    }

    if update.is_empty() {
        error!("Nothing to change");
        bail!("Nothing to change");
    }

    if let Some(action) = update.action {
        info!("Update action: {} -> {}", or_na(case.action.as_deref()), action);
    }
    if let Some(url) = &update.avatar_url {
        info!("Update avatar_url: {} -> {}", or_na(case.avatar_url.as_deref()), url);
    }
    if let Some(customer_id) = &customer_id {
        if update.customer_id.is_some() {
            info!("Update customer: {} -> {}", case.customer_id, customer_id);
        }
    }
    if let Some(pipeline) = update.data_analysis {
        info!("Update data_analysis: {} -> {}", or_na(Some(&case.data_analysis)), pipeline);
    }
    if let Some(delivery) = update.data_delivery {
        info!("Update data_delivery: {} -> {}", or_na(Some(&case.data_delivery)), delivery);
    }
    if let Some(panels) = &update.panels {
        info!("Update panels: {} -> {}", case.panels.join(", "), panels.join(", "));
    }
    if let Some(priority) = update.priority {
        info!("Update priority: {} -> {}", case.priority_human().as_str(), priority.as_str());
    }

    let updated = store.update_case(&case_id, &update).await?;
    log_event(
        store.pool(),
        AuditEventType::CaseUpdated,
        actor,
        Some(updated.internal_id.clone()),
        json!({
            "action": updated.action,
            "customer_id": updated.customer_id,
            "data_analysis": updated.data_analysis,
            "data_delivery": updated.data_delivery,
            "panels": updated.panels,
            "priority": updated.priority,
        }),
    )
    .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_na() {
        assert_eq!(or_na(None), "NA");
        assert_eq!(or_na(Some("")), "NA");
        assert_eq!(or_na(Some("hold")), "hold");
    }
}

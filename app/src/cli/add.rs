// ==============================================================================
// cli/add.rs - `cg add`
// ==============================================================================
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::info;

use cg_core::audit::{log_event, AuditEventType};
use cg_core::constants::{DataDelivery, PhenotypeStatus, Pipeline, Priority, Sex};
use cg_core::store::{NewCase, NewCustomer, NewSample, Store};

#[derive(Subcommand, Debug)]
pub enum AddCommand {
    /// Add a new customer
    Customer {
        internal_id: String,
        name: String,
        /// Customer group, created when missing. Defaults to the customer id.
        #[arg(long)]
        group: Option<String>,
        #[arg(long, default_value = "")]
        invoice_address: String,
        #[arg(long, default_value = "")]
        invoice_reference: String,
        #[arg(long)]
        scout_access: bool,
    },

    /// Add a new user
    User {
        #[arg(short, long)]
        admin: bool,
        #[arg(short, long = "customer")]
        customer_id: String,
        email: String,
        name: String,
    },

    /// Add a sample
    Sample {
        /// LIMS id for the sample
        #[arg(short, long = "lims")]
        lims_id: Option<String>,
        #[arg(short, long)]
        order: Option<String>,
        /// Sample pedigree sex
        #[arg(short, long)]
        sex: Sex,
        /// Application tag
        #[arg(short, long)]
        application: String,
        #[arg(long)]
        downsampled_to: Option<i64>,
        customer_id: String,
        name: String,
    },

    /// Add a case
    Case {
        #[arg(long, default_value = "standard")]
        priority: Priority,
        /// Default gene panels
        #[arg(short, long = "panel", required = true)]
        panels: Vec<String>,
        #[arg(long, default_value = "mip-dna")]
        data_analysis: Pipeline,
        #[arg(long, default_value = "scout")]
        data_delivery: DataDelivery,
        customer_id: String,
        name: String,
    },

    /// Relate a sample to a case
    Relationship {
        #[arg(short, long)]
        mother: Option<String>,
        #[arg(short, long)]
        father: Option<String>,
        #[arg(short, long)]
        status: PhenotypeStatus,
        case_id: String,
        sample_id: String,
    },
}

pub async fn run(store: &Store, command: AddCommand, actor: &str) -> Result<()> {
    match command {
        AddCommand::Customer {
            internal_id,
            name,
            group,
            invoice_address,
            invoice_reference,
            scout_access,
        } => {
            if let Some(existing) = store.customer(&internal_id).await? {
                bail!("customer already added: {}", existing.name);
            }

            let group_id = group.unwrap_or_else(|| internal_id.clone());
            let group = match store.customer_group(&group_id).await? {
                Some(group) => group,
                None => {
                    info!("Creating customer group {}", group_id);
                    store.add_customer_group(&group_id, &group_id).await?
                }
            };

            let customer = store
                .add_customer(&NewCustomer {
                    internal_id,
                    name,
                    customer_group_id: group.id,
                    invoice_address,
                    invoice_reference,
                    scout_access,
                })
                .await?;
            println!("customer added: {} ({})", customer.internal_id, customer.id);
        }

        AddCommand::User {
            admin,
            customer_id,
            email,
            name,
        } => {
            let Some(customer) = store.customer(&customer_id).await? else {
                bail!("customer not found: {}", customer_id);
            };
            if let Some(existing) = store.user(&email).await? {
                bail!("user already added: {}", existing.name);
            }

            let user = store.add_user(customer.id, &email, &name, admin).await?;
            println!("user added: {} ({})", user.email, user.id);
        }

        AddCommand::Sample {
            lims_id,
            order,
            sex,
            application,
            downsampled_to,
            customer_id,
            name,
        } => {
            let Some(customer) = store.customer(&customer_id).await? else {
                bail!("customer not found: {}", customer_id);
            };
            let Some(version) = store.latest_version(&application).await? else {
                bail!("application not found: {}", application);
            };
            if let Some(lims_id) = &lims_id {
                if let Some(existing) = store.sample(lims_id).await? {
                    bail!("sample already added: {}", existing.internal_id);
                }
            }

            let mut new = NewSample::new(name, sex, customer.id, version.id);
            new.internal_id = lims_id;
            new.order = order;
            new.downsampled_to = downsampled_to;

            let sample = store.add_sample(&new).await.context("Failed to add sample")?;
            log_event(
                store.pool(),
                AuditEventType::SampleAdded,
                actor,
                Some(sample.internal_id.clone()),
                json!({ "customer": customer.internal_id, "application": application }),
            )
            .await;
            println!("added new sample: {}", sample.internal_id);
        }

        AddCommand::Case {
            priority,
            panels,
            data_analysis,
            data_delivery,
            customer_id,
            name,
        } => {
            let Some(customer) = store.customer(&customer_id).await? else {
                bail!("customer not found: {}", customer_id);
            };
            for panel in &panels {
                if store.panel(panel).await?.is_none() {
                    bail!("{}: panel not found", panel);
                }
            }
            if let Some(existing) = store.find_family(customer.id, &name).await? {
                bail!("case already added: {} ({})", existing.name, existing.internal_id);
            }

            let mut new = NewCase::new(customer.id, name, data_analysis, data_delivery);
            new.panels = panels;
            new.priority = priority;

            let case = store.add_case(&new).await.context("Failed to add case")?;
            log_event(
                store.pool(),
                AuditEventType::CaseCreated,
                actor,
                Some(case.internal_id.clone()),
                json!({ "customer": customer.internal_id, "panels": case.panels }),
            )
            .await;
            println!("added new case: {}", case.internal_id);
        }

        AddCommand::Relationship {
            mother,
            father,
            status,
            case_id,
            sample_id,
        } => {
            let Some(case) = store.family(&case_id).await? else {
                bail!("case not found: {}", case_id);
            };
            let Some(sample) = store.sample(&sample_id).await? else {
                bail!("sample not found: {}", sample_id);
            };
            if store.link(&case_id, &sample_id).await?.is_some() {
                bail!("sample {} already related to {}", sample_id, case_id);
            }

            let mother_id = parent_id(store, mother.as_deref()).await?;
            let father_id = parent_id(store, father.as_deref()).await?;

            store
                .relate_sample(case.id, sample.id, status, mother_id, father_id)
                .await?;
            println!("related sample to case");
        }
    }

    Ok(())
}

async fn parent_id(store: &Store, internal_id: Option<&str>) -> Result<Option<i32>> {
    let Some(internal_id) = internal_id else {
        return Ok(None);
    };
    match store.sample(internal_id).await? {
        Some(parent) => Ok(Some(parent.id)),
        None => bail!("parent sample not found: {}", internal_id),
    }
}

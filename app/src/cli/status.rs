// ==============================================================================
// cli/status.rs - `cg status`
// ==============================================================================
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::{BTreeSet, HashMap};

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use cg_core::constants::{CaseAction, Pipeline, Priority};
use cg_core::models::Sample;
use cg_core::status_view::{render_cases, OutputType, ViewOptions};
use cg_core::store::{CaseFilters, Stage, Store};

const PAGE_SIZE: usize = 30;

#[derive(Subcommand, Debug)]
pub enum StatusCommand {
    /// Which cases will be analyzed?
    Analysis,

    /// Progress of each case
    Cases(CasesArgs),

    /// View status of samples
    Samples {
        /// Skip initial records
        #[arg(short, long, default_value_t = 0)]
        skip: usize,
    },

    /// View status of cases, most recent first
    Families {
        #[arg(short, long, default_value_t = 0)]
        skip: usize,
    },
}

#[derive(Args, Debug)]
pub struct CasesArgs {
    /// How to display status
    #[arg(short, long = "output-type", default_value = "bool")]
    pub output: OutputType,
    /// Show status information otherwise left out
    #[arg(long)]
    pub verbose: bool,
    /// Days to go back
    #[arg(long, default_value_t = 31)]
    pub days: i64,
    #[arg(long)]
    pub internal_id: Option<String>,
    /// Search by name given by customer
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub action: Option<CaseAction>,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub data_analysis: Option<Pipeline>,
    #[arg(long)]
    pub sample_id: Option<String>,
    #[arg(short = 'c', long)]
    pub customer_id: Option<String>,
    #[arg(short = 'C', long)]
    pub exclude_customer_id: Option<String>,
    #[arg(short = 'r', long)]
    pub only_received: bool,
    #[arg(short = 'R', long)]
    pub exclude_received: bool,
    #[arg(short = 'p', long)]
    pub only_prepared: bool,
    #[arg(short = 'P', long)]
    pub exclude_prepared: bool,
    #[arg(short = 's', long)]
    pub only_sequenced: bool,
    #[arg(short = 'S', long)]
    pub exclude_sequenced: bool,
    #[arg(short = 'a', long)]
    pub only_analysed: bool,
    #[arg(short = 'A', long)]
    pub exclude_analysed: bool,
    #[arg(short = 'u', long)]
    pub only_uploaded: bool,
    #[arg(short = 'U', long)]
    pub exclude_uploaded: bool,
    #[arg(short = 'd', long)]
    pub only_delivered: bool,
    #[arg(short = 'D', long)]
    pub exclude_delivered: bool,
    #[arg(short = 'i', long)]
    pub only_invoiced: bool,
    #[arg(short = 'I', long)]
    pub exclude_invoiced: bool,
}

impl CasesArgs {
    fn stages(&self) -> (BTreeSet<Stage>, BTreeSet<Stage>) {
        let flags = [
            (Stage::Received, self.only_received, self.exclude_received),
            (Stage::Prepared, self.only_prepared, self.exclude_prepared),
            (Stage::Sequenced, self.only_sequenced, self.exclude_sequenced),
            (Stage::Analysed, self.only_analysed, self.exclude_analysed),
            (Stage::Uploaded, self.only_uploaded, self.exclude_uploaded),
            (Stage::Delivered, self.only_delivered, self.exclude_delivered),
            (Stage::Invoiced, self.only_invoiced, self.exclude_invoiced),
        ];
        let only = flags.iter().filter(|f| f.1).map(|f| f.0).collect();
        let exclude = flags.iter().filter(|f| f.2).map(|f| f.0).collect();
        (only, exclude)
    }

    fn view_options(&self) -> ViewOptions {
        ViewOptions {
            output: self.output,
            verbose: self.verbose,
            with_name: self.name.is_some(),
            with_data_analysis: self.data_analysis.is_some(),
        }
    }
}

async fn customer_pk(store: &Store, internal_id: Option<&str>) -> Result<Option<i32>> {
    let Some(internal_id) = internal_id else {
        return Ok(None);
    };
    match store.customer(internal_id).await? {
        Some(customer) => Ok(Some(customer.id)),
        None => bail!("customer not found: {}", internal_id),
    }
}

/// One line per sample with the furthest lab step reached
pub fn sample_line(sample: &Sample, customer: &str) -> String {
    let mut message = format!("{} ({})", sample.internal_id, customer);
    if let Some(sequenced_at) = sample.sequenced_at {
        message.push_str(&format!(" [SEQUENCED: {}]", sequenced_at.date_naive()));
    } else if sample.received_at.is_some() && sample.reads > 0 {
        message.push_str(&format!(" [READS: {}]", sample.reads));
    } else if let Some(received_at) = sample.received_at {
        message.push_str(&format!(" [RECEIVED: {}]", received_at.date_naive()));
    } else {
        message.push_str(" [NOT RECEIVED]");
    }
    message
}

pub async fn run(store: &Store, command: StatusCommand) -> Result<()> {
    match command {
        StatusCommand::Analysis => {
            for case in store.cases_to_analyze(None).await? {
                println!("{} ({}) {}", case.internal_id, case.name, case.data_analysis);
            }
        }

        StatusCommand::Cases(args) => {
            let (only, exclude) = args.stages();
            let filters = CaseFilters {
                days: args.days,
                internal_id: args.internal_id.clone(),
                name: args.name.clone(),
                action: args.action,
                priority: args.priority,
                customer_id: customer_pk(store, args.customer_id.as_deref()).await?,
                exclude_customer_id: customer_pk(store, args.exclude_customer_id.as_deref()).await?,
                data_analysis: args.data_analysis,
                sample_id: args.sample_id.clone(),
                only,
                exclude,
            };

            let cases = store.cases(&filters).await?;
            println!("{}", render_cases(&cases, &args.view_options()));
        }

        StatusCommand::Samples { skip } => {
            let customers: HashMap<i32, String> = store
                .customers()
                .await?
                .into_iter()
                .map(|c| (c.id, c.internal_id))
                .collect();

            for sample in store.samples(None, None).await?.iter().skip(skip).take(PAGE_SIZE) {
                let customer = customers.get(&sample.customer_id).map_or("?", String::as_str);
                println!("{}", sample_line(sample, customer));
            }
        }

        StatusCommand::Families { skip } => {
            for case in store.families(None, None, None).await?.into_iter().skip(skip).take(PAGE_SIZE) {
                let mut message = format!("{} ({})", case.internal_id, case.priority);
                if let Some(completed_at) = store
                    .latest_analysis(case.id)
                    .await?
                    .and_then(|a| a.completed_at)
                {
                    message.push_str(&format!(" {}", completed_at.date_naive()));
                }
                if let Some(action) = &case.action {
                    message.push_str(&format!(" [{}]", action.to_uppercase()));
                }
                println!("{}", message);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> Sample {
        let ordered = Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap();
        Sample {
            id: 1,
            internal_id: "ACC1".to_string(),
            name: "sample1".to_string(),
            customer_id: 1,
            application_version_id: 1,
            organism_id: None,
            invoice_id: None,
            sex: "female".to_string(),
            comment: None,
            control: None,
            downsampled_to: None,
            is_tumour: false,
            order: None,
            priority: 1,
            ticket_number: None,
            reads: 0,
            ordered_at: ordered,
            received_at: None,
            prepared_at: None,
            sequenced_at: None,
            delivered_at: None,
            invoiced_at: None,
            created_at: ordered,
        }
    }

    #[test]
    fn test_sample_lines() {
        let mut s = sample();
        assert_eq!(sample_line(&s, "cust000"), "ACC1 (cust000) [NOT RECEIVED]");

        s.received_at = Some(Utc.with_ymd_and_hms(2026, 9, 3, 8, 0, 0).unwrap());
        assert_eq!(sample_line(&s, "cust000"), "ACC1 (cust000) [RECEIVED: 2026-09-03]");

        s.reads = 1200;
        assert_eq!(sample_line(&s, "cust000"), "ACC1 (cust000) [READS: 1200]");

        s.sequenced_at = Some(Utc.with_ymd_and_hms(2026, 9, 9, 8, 0, 0).unwrap());
        assert_eq!(sample_line(&s, "cust000"), "ACC1 (cust000) [SEQUENCED: 2026-09-09]");
    }

    #[test]
    fn test_stage_flags() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: CasesArgs,
        }

        let wrapper = Wrapper::try_parse_from(["status", "-r", "-U", "-o", "count"]).unwrap();
        let (only, exclude) = wrapper.args.stages();
        assert_eq!(only.into_iter().collect::<Vec<_>>(), vec![Stage::Received]);
        assert_eq!(exclude.into_iter().collect::<Vec<_>>(), vec![Stage::Uploaded]);
        assert_eq!(wrapper.args.output, OutputType::Count);
    }
}

// ==============================================================================
// cli/compress.rs - `cg compress`, `cg clean`, `cg decompress`
// ==============================================================================
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::info;

use cg_core::audit::{log_event, AuditEventType};
use cg_core::config::CgConfig;
use cg_core::crunchy::CrunchyApi;
use cg_core::models::Family;
use cg_core::store::Store;

#[derive(Subcommand, Debug)]
pub enum CompressCommand {
    /// Find cases with FASTQ files and compress them into SPRING
    Fastq {
        #[arg(short, long = "case-id")]
        case_id: Option<String>,
        #[arg(short = 'n', long, default_value_t = 5)]
        number_of_conversions: usize,
        /// Number of tasks for the slurm job
        #[arg(short = 't', long, default_value_t = 12)]
        ntasks: u32,
        /// Memory (GB) for the slurm job
        #[arg(short, long, default_value_t = 50)]
        mem: u32,
        #[arg(short, long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CleanCommand {
    /// Remove FASTQ files that are safely compressed
    Fastq {
        #[arg(short, long = "case-id")]
        case_id: Option<String>,
        #[arg(short, long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DecompressCommand {
    /// Unpack the SPRING archives of a case
    Spring {
        case_id: String,
        #[arg(short, long)]
        dry_run: bool,
    },
}

async fn fastq_cases(store: &Store, case_id: Option<&str>) -> Result<Vec<Family>> {
    match case_id {
        Some(case_id) => match store.family(case_id).await? {
            Some(case) => Ok(vec![case]),
            None => bail!("case not found: {}", case_id),
        },
        None => Ok(store.families(None, None, None).await?),
    }
}

async fn case_sample_ids(store: &Store, cases: &[Family]) -> Result<Vec<String>> {
    let mut sample_ids = Vec::new();
    for case in cases {
        for sample in store.case_samples(case.id).await? {
            if !sample_ids.contains(&sample.internal_id) {
                sample_ids.push(sample.internal_id);
            }
        }
    }
    Ok(sample_ids)
}

pub async fn compress(store: &Store, config: &CgConfig, command: CompressCommand, actor: &str) -> Result<()> {
    let CompressCommand::Fastq {
        case_id,
        number_of_conversions,
        ntasks,
        mem,
        dry_run,
    } = command;

    info!("Running compress FASTQ");
    let crunchy = CrunchyApi::new(config, dry_run).with_resources(ntasks, mem);

    let mut cases_converted = 0;
    let mut individuals_converted = 0;

    for case in fastq_cases(store, case_id.as_deref()).await? {
        if cases_converted >= number_of_conversions {
            break;
        }

        info!("Searching for FASTQ files in case {}", case.internal_id);
        let mut case_converted = true;
        for sample in store.case_samples(case.id).await? {
            if !crunchy.compress_fastq(&sample.internal_id).await? {
                info!("Skipping individual {}", sample.internal_id);
                case_converted = false;
                continue;
            }
            individuals_converted += 1;
            if !dry_run {
                log_event(
                    store.pool(),
                    AuditEventType::CompressionSubmitted,
                    actor,
                    Some(sample.internal_id.clone()),
                    json!({ "case": case.internal_id }),
                )
                .await;
            }
        }

        if case_converted {
            cases_converted += 1;
        }
    }

    info!(
        "{} individuals in {} (completed) cases were compressed",
        individuals_converted, cases_converted
    );
    Ok(())
}

pub async fn clean(store: &Store, config: &CgConfig, command: CleanCommand) -> Result<()> {
    let CleanCommand::Fastq { case_id, dry_run } = command;

    info!("Running clean FASTQ");
    let crunchy = CrunchyApi::new(config, dry_run);
    let cases = fastq_cases(store, case_id.as_deref()).await?;

    let mut cleaned = 0;
    for sample_id in case_sample_ids(store, &cases).await? {
        if !crunchy.clean_fastq(&sample_id)? {
            info!("Skipping individual {}", sample_id);
            continue;
        }
        cleaned += 1;
    }

    info!("Cleaned FASTQ files in {} individuals", cleaned);
    Ok(())
}

pub async fn decompress(store: &Store, config: &CgConfig, command: DecompressCommand, actor: &str) -> Result<()> {
    let DecompressCommand::Spring { case_id, dry_run } = command;

    info!("Running decompress SPRING");
    let crunchy = CrunchyApi::new(config, dry_run);
    let cases = fastq_cases(store, Some(&case_id)).await?;

    let mut decompressed = 0;
    for sample_id in case_sample_ids(store, &cases).await? {
        if !crunchy.decompress_spring(&sample_id).await? {
            info!("Skipping individual {}", sample_id);
            continue;
        }
        decompressed += 1;
        if !dry_run {
            log_event(
                store.pool(),
                AuditEventType::DecompressionSubmitted,
                actor,
                Some(sample_id.clone()),
                json!({ "case": case_id }),
            )
            .await;
        }
    }

    info!("Decompressed SPRING archives in {} individuals", decompressed);
    Ok(())
}

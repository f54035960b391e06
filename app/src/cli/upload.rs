// ==============================================================================
// cli/upload.rs - `cg upload`
// ==============================================================================
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::{info, warn};

use cg_core::config::CgConfig;
use cg_core::store::Store;
use cg_core::upload::{GenotypeApi, GisaidApi, UploadApi, UploadVogueApi, VogueApi};

#[derive(Subcommand, Debug)]
pub enum UploadCommand {
    /// Upload coverage of every sample in a case
    Coverage {
        family_id: String,
        #[arg(long)]
        dry_run: bool,
    },

    /// Load a case into the variant portal
    Delivery {
        family_id: String,
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the full upload of a case
    Case {
        family_id: String,
        /// Upload again even if already uploaded or started
        #[arg(long)]
        restart: bool,
    },

    /// Upload every analysis that is ready (cron entry point)
    Auto,

    /// Load data into the trending portal
    #[command(subcommand)]
    Vogue(VogueCommand),

    /// Build the GISAID submission files of a SARS-CoV-2 case
    Gisaid {
        family_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum VogueCommand {
    /// Application tags from the status database
    Apptags,
    /// Genotype results from the genotype database
    Genotype {
        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },
    /// Flowcells sequenced in the last days
    Flowcells {
        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },
}

pub async fn run(store: &Store, config: &CgConfig, command: UploadCommand, actor: &str) -> Result<()> {
    match command {
        UploadCommand::Coverage { family_id, dry_run } => {
            UploadApi::new(store, config)
                .with_dry_run(dry_run)
                .upload_coverage(&family_id)
                .await
                .with_context(|| format!("Coverage upload of {} failed", family_id))?;
            info!("Coverage uploaded for {}", family_id);
        }

        UploadCommand::Delivery { family_id, dry_run } => {
            let path = UploadApi::new(store, config)
                .with_dry_run(dry_run)
                .upload_delivery(&family_id)
                .await
                .with_context(|| format!("Variant portal upload of {} failed", family_id))?;
            info!("Loaded {} using {}", family_id, path.display());
        }

        UploadCommand::Case { family_id, restart } => {
            UploadApi::new(store, config)
                .upload_case(&family_id, restart, actor)
                .await
                .with_context(|| format!("Upload of {} failed", family_id))?;
        }

        UploadCommand::Auto => {
            let summary = UploadApi::new(store, config).upload_pending(actor).await?;
            if !summary.failed.is_empty() {
                warn!("Failed uploads: {}", summary.failed.join(", "));
                bail!("{} of {} uploads failed", summary.failed.len(), summary.failed.len() + summary.uploaded.len());
            }
        }

        UploadCommand::Vogue(command) => {
            let api = UploadVogueApi::new(
                store,
                GenotypeApi::new(&config.genotype_binary),
                VogueApi::new(&config.vogue_binary),
            );
            match command {
                VogueCommand::Apptags => {
                    let count = api.load_apptags().await?;
                    info!("Loaded {} application tags", count);
                }
                VogueCommand::Genotype { days } => {
                    api.load_genotype(days).await?;
                }
                VogueCommand::Flowcells { days } => {
                    api.load_flowcells(days).await?;
                }
            }
        }

        UploadCommand::Gisaid { family_id } => {
            if store.family(&family_id).await?.is_none() {
                bail!("Could not find case {} in the status database", family_id);
            }
            let files = GisaidApi::new(&config.mutant_root, &config.gisaid_submitter).build_files(&family_id)?;
            println!("{}", files.csv.display());
            println!("{}", files.fasta.display());
        }
    }

    Ok(())
}

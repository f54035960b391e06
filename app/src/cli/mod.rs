// ==============================================================================
// cli/mod.rs - Command Line Definition
// ==============================================================================
// Description: clap command tree and the environment-backed configuration
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod add;
pub mod compress;
pub mod orders;
pub mod set;
pub mod status;
pub mod transfer;
pub mod upload;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use cg_core::config::{resolve_database_url, CgConfig, CrunchyConfig, SlurmConfig, ToolConfig};
use cg_core::constants::SlurmQos;

#[derive(Parser, Debug)]
#[command(author, version, about = "Clinical genomics status database and upload tooling", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply database migrations
    Migrate,

    /// Add things to the status database
    #[command(subcommand)]
    Add(add::AddCommand),

    /// Change things in the status database
    #[command(subcommand)]
    Set(set::SetCommand),

    /// View status of things
    #[command(subcommand)]
    Status(status::StatusCommand),

    /// Compress FASTQ into SPRING
    #[command(subcommand)]
    Compress(compress::CompressCommand),

    /// Remove FASTQ that is safely archived
    #[command(subcommand)]
    Clean(compress::CleanCommand),

    /// Unpack SPRING archives
    #[command(subcommand)]
    Decompress(compress::DecompressCommand),

    /// Upload results to the portals
    #[command(subcommand)]
    Upload(upload::UploadCommand),

    /// Validate and submit orders
    #[command(subcommand)]
    Orders(orders::OrdersCommand),

    /// Print per-sample QC metrics from a metrics deliverables file
    Metrics {
        deliverables: PathBuf,
    },

    /// Print the bundle of a MIP analysis as JSON
    Bundle {
        config: PathBuf,
        sampleinfo: PathBuf,
    },

    /// Move data from other systems into the status database
    #[command(subcommand)]
    Transfer(transfer::TransferCommand),
}

impl Commands {
    /// Commands that work on local files only
    pub fn needs_database(&self) -> bool {
        !matches!(self, Commands::Metrics { .. } | Commands::Bundle { .. })
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Database URL (or use DATABASE_URL_FILE env var)
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "CG_ANALYSIS_ROOT", global = true, default_value = "/home/proj/production/rare-disease/cases")]
    pub analysis_root: PathBuf,

    #[arg(long, env = "CG_FASTQ_ROOT", global = true, default_value = "/home/proj/production/fastq")]
    pub fastq_root: PathBuf,

    #[arg(long, env = "CHANJO_BINARY", global = true, default_value = "chanjo")]
    pub chanjo_binary: String,

    #[arg(long, env = "CHANJO_CONFIG", global = true)]
    pub chanjo_config: Option<PathBuf>,

    #[arg(long, env = "SCOUT_BINARY", global = true, default_value = "scout")]
    pub scout_binary: String,

    #[arg(long, env = "SCOUT_CONFIG", global = true)]
    pub scout_config: Option<PathBuf>,

    #[arg(long, env = "VOGUE_BINARY", global = true, default_value = "vogue")]
    pub vogue_binary: String,

    #[arg(long, env = "GENOTYPE_BINARY", global = true, default_value = "genotype")]
    pub genotype_binary: String,

    #[arg(long, env = "CRUNCHY_CONDA_ENV", global = true, default_value = "S_crunchy")]
    pub crunchy_conda_env: String,

    #[arg(long, env = "CRUNCHY_CRAM_REFERENCE", global = true, default_value = "/home/proj/reference/grch37.fasta")]
    pub crunchy_cram_reference: PathBuf,

    #[arg(long, env = "SLURM_ACCOUNT", global = true, default_value = "production")]
    pub slurm_account: String,

    #[arg(long, env = "SLURM_MAIL_USER", global = true, default_value = "clinical-genomics@localhost")]
    pub slurm_mail_user: String,

    #[arg(long, env = "SLURM_QOS", global = true, default_value = "low")]
    pub slurm_qos: SlurmQos,

    #[arg(long, env = "MUTANT_ROOT", global = true, default_value = "/home/proj/production/mutant/cases")]
    pub mutant_root: PathBuf,

    #[arg(long, env = "GISAID_SUBMITTER", global = true, default_value = "cg-submitter")]
    pub gisaid_submitter: String,

    #[arg(long, env = "CGSTATS_DATABASE_URL", global = true, hide_env_values = true)]
    pub cgstats_database_url: Option<String>,

    #[arg(long, env = "CGSTATS_ROOT", global = true, default_value = "/home/proj/production/flowcells")]
    pub cgstats_root: PathBuf,
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<CgConfig> {
        let database_url = resolve_database_url(self.database_url).context("Failed to resolve database URL")?;

        Ok(CgConfig {
            database_url,
            analysis_root: self.analysis_root,
            fastq_root: self.fastq_root,
            chanjo: ToolConfig {
                binary: self.chanjo_binary,
                config: self.chanjo_config,
            },
            scout: ToolConfig {
                binary: self.scout_binary,
                config: self.scout_config,
            },
            vogue_binary: self.vogue_binary,
            genotype_binary: self.genotype_binary,
            crunchy: CrunchyConfig {
                conda_env: self.crunchy_conda_env,
                cram_reference: self.crunchy_cram_reference,
            },
            slurm: SlurmConfig {
                account: self.slurm_account,
                mail_user: self.slurm_mail_user,
                qos: self.slurm_qos,
            },
            mutant_root: self.mutant_root,
            gisaid_submitter: self.gisaid_submitter,
            cgstats_database_url: self.cgstats_database_url,
            cgstats_root: self.cgstats_root,
        })
    }
}

/// Who to record in the audit trail for CLI actions
pub fn actor() -> String {
    std::env::var("USER").unwrap_or_else(|_| "cg".to_string())
}

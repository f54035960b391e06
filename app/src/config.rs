// ==============================================================================
// config.rs - Runtime Configuration
// ==============================================================================
// Description: Paths, external tool locations and SLURM settings
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;

use thiserror::Error;

use crate::constants::SlurmQos;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("DATABASE_URL or DATABASE_URL_FILE must be provided")]
    MissingDatabaseUrl,

    #[error("Failed to read DATABASE_URL_FILE {path}: {source}")]
    DatabaseUrlFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// An external binary with an optional config file
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub binary: String,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlurmConfig {
    pub account: String,
    pub mail_user: String,
    pub qos: SlurmQos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrunchyConfig {
    pub conda_env: String,
    pub cram_reference: PathBuf,
}

/// Everything the sub-APIs need, collected once at startup
#[derive(Debug, Clone)]
pub struct CgConfig {
    pub database_url: String,
    pub analysis_root: PathBuf,
    pub fastq_root: PathBuf,
    pub chanjo: ToolConfig,
    pub scout: ToolConfig,
    pub vogue_binary: String,
    pub genotype_binary: String,
    pub crunchy: CrunchyConfig,
    pub slurm: SlurmConfig,
    pub mutant_root: PathBuf,
    pub gisaid_submitter: String,
    pub cgstats_database_url: Option<String>,
    pub cgstats_root: PathBuf,
}

/// Use the given URL, otherwise read it from the file named by
/// DATABASE_URL_FILE (docker secrets).
pub fn resolve_database_url(url: Option<String>) -> Result<String, ConfigError> {
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        return Ok(url);
    }

    match std::env::var("DATABASE_URL_FILE") {
        Ok(path) => std::fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|source| ConfigError::DatabaseUrlFile { path, source }),
        Err(_) => Err(ConfigError::MissingDatabaseUrl),
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl CgConfig {
    /// Build the configuration from environment variables. Used by the
    /// services; the CLI goes through clap with the same variable names.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = resolve_database_url(env_opt("DATABASE_URL"))?;

        let qos_raw = env_or("SLURM_QOS", "low");
        let qos = qos_raw.parse().map_err(|e: crate::constants::UnknownOption| {
            ConfigError::Invalid {
                name: "SLURM_QOS",
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            database_url,
            analysis_root: PathBuf::from(env_or("CG_ANALYSIS_ROOT", "/home/proj/production/rare-disease/cases")),
            fastq_root: PathBuf::from(env_or("CG_FASTQ_ROOT", "/home/proj/production/fastq")),
            chanjo: ToolConfig {
                binary: env_or("CHANJO_BINARY", "chanjo"),
                config: env_opt("CHANJO_CONFIG").map(PathBuf::from),
            },
            scout: ToolConfig {
                binary: env_or("SCOUT_BINARY", "scout"),
                config: env_opt("SCOUT_CONFIG").map(PathBuf::from),
            },
            vogue_binary: env_or("VOGUE_BINARY", "vogue"),
            genotype_binary: env_or("GENOTYPE_BINARY", "genotype"),
            crunchy: CrunchyConfig {
                conda_env: env_or("CRUNCHY_CONDA_ENV", "S_crunchy"),
                cram_reference: PathBuf::from(env_or("CRUNCHY_CRAM_REFERENCE", "/home/proj/reference/grch37.fasta")),
            },
            slurm: SlurmConfig {
                account: env_or("SLURM_ACCOUNT", "production"),
                mail_user: env_or("SLURM_MAIL_USER", "clinical-genomics@localhost"),
                qos,
            },
            mutant_root: PathBuf::from(env_or("MUTANT_ROOT", "/home/proj/production/mutant/cases")),
            gisaid_submitter: env_or("GISAID_SUBMITTER", "cg-submitter"),
            cgstats_database_url: env_opt("CGSTATS_DATABASE_URL"),
            cgstats_root: PathBuf::from(env_or("CGSTATS_ROOT", "/home/proj/production/flowcells")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_explicit_url_wins() {
        let url = resolve_database_url(Some("postgres://cg@localhost/cg".to_string())).unwrap();
        assert_eq!(url, "postgres://cg@localhost/cg");
    }

    #[test]
    fn test_url_file_fallback_is_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "postgres://cg@db/cg  ").unwrap();

        std::env::set_var("DATABASE_URL_FILE", file.path());
        let url = resolve_database_url(None).unwrap();
        std::env::remove_var("DATABASE_URL_FILE");

        assert_eq!(url, "postgres://cg@db/cg");
    }
}

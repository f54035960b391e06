// ==============================================================================
// slurm.rs - SLURM Batch Scripts
// ==============================================================================
// Description: Renders sbatch scripts and submits them to the cluster
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::info;

use crate::constants::SlurmQos;
use crate::process::{Process, ProcessError};

/// Job number handed back for dry runs
pub const DRY_RUN_JOB_NUMBER: u64 = 123456;

static SUBMITTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Submitted batch job (\d+)").expect("valid sbatch regex"));

#[derive(Error, Debug)]
pub enum SlurmError {
    #[error("Failed to write sbatch script {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Could not find job number in sbatch output: {0}")]
    NoJobNumber(String),
}

/// Parameters for one batch job
#[derive(Debug, Clone)]
pub struct Sbatch {
    pub job_name: String,
    pub account: String,
    pub log_dir: PathBuf,
    pub email: String,
    pub hours: u32,
    pub minutes: String,
    pub priority: SlurmQos,
    pub commands: String,
    pub error: Option<String>,
    pub exclude: Option<String>,
    pub number_tasks: u32,
    pub memory: u32,
}

impl Sbatch {
    pub fn new(job_name: impl Into<String>, account: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_name: job_name.into(),
            account: account.into(),
            log_dir: log_dir.into(),
            email: String::new(),
            hours: 24,
            minutes: "00".to_string(),
            priority: SlurmQos::default(),
            commands: String::new(),
            error: None,
            exclude: None,
            number_tasks: 1,
            memory: 1,
        }
    }
}

pub struct SlurmApi {
    process: Process,
    dry_run: bool,
}

impl SlurmApi {
    pub fn new(dry_run: bool) -> Self {
        Self {
            process: Process::new("sbatch", None, None),
            dry_run,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn generate_sbatch_content(sbatch: &Sbatch) -> String {
        let log_dir = sbatch.log_dir.display();
        let mut lines = vec![
            "#! /bin/bash -l".to_string(),
            format!("#SBATCH --account={}", sbatch.account),
            format!("#SBATCH --job-name={}", sbatch.job_name),
            format!("#SBATCH --output={}/{}.stdout", log_dir, sbatch.job_name),
            format!("#SBATCH --error={}/{}.stderr", log_dir, sbatch.job_name),
            format!("#SBATCH --ntasks={}", sbatch.number_tasks),
            format!("#SBATCH --mem={}G", sbatch.memory),
            format!("#SBATCH --time={}:{}:00", sbatch.hours, sbatch.minutes),
            format!("#SBATCH --qos={}", sbatch.priority),
        ];

        if let Some(exclude) = sbatch.exclude.as_deref().filter(|e| !e.is_empty()) {
            lines.push(format!("#SBATCH --exclude={}", exclude));
        }

        lines.push("#SBATCH --mail-type=FAIL".to_string());
        lines.push(format!("#SBATCH --mail-user={}", sbatch.email));
        lines.push(String::new());
        lines.push("set -eu pipefail".to_string());
        lines.push(String::new());
        lines.push("echo \"Running on: $(hostname)\"".to_string());
        lines.push(String::new());

        if let Some(error) = &sbatch.error {
            lines.push("error() {".to_string());
            lines.push(error.trim_end().to_string());
            lines.push("    exit 1".to_string());
            lines.push("}".to_string());
            lines.push(String::new());
            lines.push("trap error ERR".to_string());
            lines.push(String::new());
        }

        lines.push(sbatch.commands.trim_end().to_string());
        lines.push(String::new());
        lines.join("\n")
    }

    /// Write the script to `path` and submit it. Returns the job number.
    pub async fn submit_sbatch(&self, content: &str, path: &Path) -> Result<u64, SlurmError> {
        if self.dry_run {
            info!("Would submit sbatch {} with content:\n{}", path.display(), content);
            return Ok(DRY_RUN_JOB_NUMBER);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SlurmError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| SlurmError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        let path_str = path.display().to_string();
        let output = self.process.run_command(&[&path_str], false).await?;
        let job_number = parse_job_number(&output.stdout)?;

        info!("Submitted {} as job {}", path.display(), job_number);
        Ok(job_number)
    }
}

pub fn parse_job_number(stdout: &str) -> Result<u64, SlurmError> {
    SUBMITTED_RE
        .captures(stdout)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| SlurmError::NoJobNumber(stdout.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sbatch() -> Sbatch {
        let mut sbatch = Sbatch::new("ACC1_run1_fastq_to_spring", "production", "/tmp/logs");
        sbatch.email = "ops@example.com".to_string();
        sbatch.number_tasks = 12;
        sbatch.memory = 50;
        sbatch.commands = "spring -c".to_string();
        sbatch
    }

    #[test]
    fn test_header_contents() {
        let content = SlurmApi::generate_sbatch_content(&sbatch());
        assert!(content.starts_with("#! /bin/bash -l\n"));
        assert!(content.contains("#SBATCH --account=production"));
        assert!(content.contains("#SBATCH --output=/tmp/logs/ACC1_run1_fastq_to_spring.stdout"));
        assert!(content.contains("#SBATCH --ntasks=12"));
        assert!(content.contains("#SBATCH --mem=50G"));
        assert!(content.contains("#SBATCH --time=24:00:00"));
        assert!(content.contains("#SBATCH --qos=low"));
        assert!(content.contains("#SBATCH --mail-user=ops@example.com"));
        assert!(content.contains("set -eu pipefail"));
        assert!(!content.contains("trap error ERR"));
        assert!(content.trim_end().ends_with("spring -c"));
    }

    #[test]
    fn test_error_trap_precedes_commands() {
        let mut job = sbatch();
        job.error = Some("    rm -f flag".to_string());
        let content = SlurmApi::generate_sbatch_content(&job);
        let trap = content.find("trap error ERR").unwrap();
        let commands = content.find("spring -c").unwrap();
        assert!(trap < commands);
        assert!(content.contains("error() {\n    rm -f flag\n    exit 1\n}"));
    }

    #[test]
    fn test_parse_job_number() {
        assert_eq!(parse_job_number("Submitted batch job 4242\n").unwrap(), 4242);
        assert!(parse_job_number("sbatch: error: invalid account").is_err());
    }

    #[tokio::test]
    async fn test_dry_run_skips_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.sh");
        let api = SlurmApi::new(true);
        let number = api.submit_sbatch("echo hi", &path).await.unwrap();
        assert_eq!(number, DRY_RUN_JOB_NUMBER);
        assert!(!path.exists());
    }
}

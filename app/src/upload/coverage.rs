// ==============================================================================
// coverage.rs - Coverage Portal Wrapper
// ==============================================================================
// Description: Loads per-sample coverage BED output into chanjo
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::Path;

use tracing::info;

use crate::config::ToolConfig;
use crate::process::{Process, ProcessError};

/// Completeness threshold passed to every load
pub const COVERAGE_THRESHOLD: u32 = 10;

pub struct CoverageApi {
    process: Process,
    dry_run: bool,
}

impl CoverageApi {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            process: Process::new(config.binary.clone(), config.config.clone(), None).with_config_parameter("-c"),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub async fn sample_exists(&self, sample_id: &str) -> Result<bool, ProcessError> {
        let output = self
            .process
            .run_command(&["db", "samples", "--sample", sample_id], self.dry_run)
            .await?;
        let exists = output.stdout_lines().next().is_some();
        Ok(exists)
    }

    pub async fn delete_sample(&self, sample_id: &str) -> Result<(), ProcessError> {
        info!("Removing sample {} from coverage portal", sample_id);
        self.process.run_command(&["db", "remove", sample_id], self.dry_run).await?;
        Ok(())
    }

    pub async fn upload(
        &self,
        sample_id: &str,
        sample_name: &str,
        group_id: &str,
        group_name: &str,
        bed_path: &Path,
    ) -> Result<(), ProcessError> {
        let bed = bed_path.display().to_string();
        let threshold = COVERAGE_THRESHOLD.to_string();
        let args = load_args(&bed, sample_id, sample_name, group_id, group_name, &threshold);
        self.process.run_command(&args, self.dry_run).await?;
        Ok(())
    }
}

fn load_args<'a>(
    bed: &'a str,
    sample_id: &'a str,
    sample_name: &'a str,
    group_id: &'a str,
    group_name: &'a str,
    threshold: &'a str,
) -> Vec<&'a str> {
    vec![
        "load",
        bed,
        "--sample",
        sample_id,
        "--name",
        sample_name,
        "--group",
        group_id,
        "--group-name",
        group_name,
        "--threshold",
        threshold,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tool() -> ToolConfig {
        ToolConfig {
            binary: "chanjo".to_string(),
            config: Some(PathBuf::from("/etc/chanjo.yaml")),
        }
    }

    #[test]
    fn test_load_command_line() {
        let api = CoverageApi::new(&tool());
        let args = load_args("/a/ADM1.bed", "ADM1", "child", "grumpyowl", "family 1", "10");
        let argv = api.process().command_line(&args);

        assert_eq!(
            argv,
            vec![
                "chanjo", "-c", "/etc/chanjo.yaml", "load", "/a/ADM1.bed", "--sample", "ADM1", "--name", "child",
                "--group", "grumpyowl", "--group-name", "family 1", "--threshold", "10",
            ]
        );
    }

    #[tokio::test]
    async fn test_dry_run_reports_missing_sample() {
        let api = CoverageApi::new(&tool()).with_dry_run(true);
        assert!(!api.sample_exists("ADM1").await.unwrap());
        api.delete_sample("ADM1").await.unwrap();
        api.upload("ADM1", "child", "grumpyowl", "family 1", Path::new("/a/ADM1.bed"))
            .await
            .unwrap();
    }
}

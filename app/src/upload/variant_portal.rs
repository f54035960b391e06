// ==============================================================================
// variant_portal.rs - Variant Portal Wrapper
// ==============================================================================
// Description: Builds the scout load config for a MIP DNA case and loads it
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bundle::MipAnalysis;
use crate::config::ToolConfig;
use crate::models::{CaseLink, Family};
use crate::process::{Process, ProcessError};

pub const RANK_SCORE_THRESHOLD: i32 = 5;
pub const DEFAULT_GENOME_BUILD: &str = "37";

/// Panels added to every MIP DNA case on top of the ordered ones
const EXTRA_GENE_PANELS: [&str; 1] = ["OMIM-AUTO"];

/// Written next to the analysis before loading
pub const LOAD_CONFIG_NAME: &str = "scout_load_config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutSample {
    pub sample_id: String,
    pub sample_name: String,
    pub sex: String,
    pub phenotype: String,
    pub father: String,
    pub mother: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bam_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mt_bam: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcf2cytosure: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_kit: Option<String>,
    pub analysis_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutLoadConfig {
    pub owner: String,
    pub family: String,
    pub family_name: String,
    pub samples: Vec<ScoutSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcf_snv: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcf_sv: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcf_snv_research: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcf_sv_research: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcf_str: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peddy_ped: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peddy_check: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peddy_sex: Option<PathBuf>,
    pub gene_panels: Vec<String>,
    pub default_gene_panels: Vec<String>,
    pub analysis_date: NaiveDateTime,
    pub rank_score_threshold: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sv_rank_model_version: Option<String>,
    pub human_genome_build: String,
}

pub struct VariantPortalApi {
    process: Process,
    dry_run: bool,
}

impl VariantPortalApi {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            process: Process::new(config.binary.clone(), config.config.clone(), None),
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

    pub fn build_load_config(
        &self,
        case: &Family,
        owner: &str,
        links: &[CaseLink],
        analysis: &MipAnalysis,
    ) -> ScoutLoadConfig {
        build_load_config(case, owner, links, analysis)
    }

    /// The portal replaces an existing case with the same id
    pub async fn load(&self, config_path: &Path) -> Result<(), ProcessError> {
        let path = config_path.display().to_string();
        info!("Loading {} into the variant portal", path);
        self.process
            .run_command(&["load", "config", path.as_str()], self.dry_run)
            .await?;
        Ok(())
    }
}

fn tagged(analysis: &MipAnalysis, tags: &[&str]) -> Option<PathBuf> {
    analysis.bundle.first_with_tags(tags).map(|f| f.path.clone())
}

pub fn build_load_config(case: &Family, owner: &str, links: &[CaseLink], analysis: &MipAnalysis) -> ScoutLoadConfig {
    let info = &analysis.sampleinfo;

    let samples = links
        .iter()
        .map(|link| {
            let id = link.sample.internal_id.as_str();
            let bam_path = tagged(analysis, &["bam", id]);
            if bam_path.is_none() {
                warn!("No BAM file for {} in bundle {}", id, analysis.bundle.name);
            }

            ScoutSample {
                sample_id: id.to_string(),
                sample_name: link.sample.name.clone(),
                sex: link.sample.sex().as_str().to_string(),
                phenotype: link.link.status.clone(),
                father: link.father.as_ref().map_or_else(|| "0".to_string(), |s| s.internal_id.clone()),
                mother: link.mother.as_ref().map_or_else(|| "0".to_string(), |s| s.internal_id.clone()),
                bam_path,
                mt_bam: tagged(analysis, &["bam-mt", id]),
                vcf2cytosure: tagged(analysis, &["vcf2cytosure", id]),
                capture_kit: info
                    .samples
                    .iter()
                    .find(|s| s.id == id)
                    .and_then(|s| s.capture_kit.clone()),
                analysis_type: if link.sample.is_tumour { "tumour" } else { "wgs" }.to_string(),
            }
        })
        .collect();

    let mut gene_panels = case.panels.clone();
    for extra in EXTRA_GENE_PANELS {
        if !gene_panels.iter().any(|p| p == extra) {
            gene_panels.push(extra.to_string());
        }
    }

    ScoutLoadConfig {
        owner: owner.to_string(),
        family: case.internal_id.clone(),
        family_name: case.name.clone(),
        samples,
        vcf_snv: tagged(analysis, &["vcf-snv-clinical"]),
        vcf_sv: tagged(analysis, &["vcf-sv-clinical"]),
        vcf_snv_research: tagged(analysis, &["vcf-snv-research"]),
        vcf_sv_research: tagged(analysis, &["vcf-sv-research"]),
        vcf_str: tagged(analysis, &["vcf-str"]),
        peddy_ped: tagged(analysis, &["peddy", "ped"]),
        peddy_check: tagged(analysis, &["peddy", "ped-check"]),
        peddy_sex: tagged(analysis, &["peddy", "sex-check"]),
        gene_panels,
        default_gene_panels: case.panels.clone(),
        analysis_date: info.date,
        rank_score_threshold: RANK_SCORE_THRESHOLD,
        rank_model_version: info.rank_model_version.clone(),
        sv_rank_model_version: info.sv_rank_model_version.clone(),
        human_genome_build: info
            .genome_build
            .clone()
            .unwrap_or_else(|| DEFAULT_GENOME_BUILD.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::fixtures::{case, mip_analysis, trio};

    #[test]
    fn test_load_config_for_trio() {
        let config = build_load_config(&case(), "cust000", &trio(), &mip_analysis());

        assert_eq!(config.owner, "cust000");
        assert_eq!(config.family, "grumpyowl");
        assert_eq!(config.family_name, "family 1");
        assert_eq!(config.samples.len(), 3);
        assert_eq!(config.vcf_snv, Some(PathBuf::from("/a/snv_clinical.vcf.gz")));
        assert_eq!(config.vcf_snv_research, Some(PathBuf::from("/a/snv_research.vcf.gz")));
        assert!(config.vcf_sv_research.is_none());
        assert_eq!(config.default_gene_panels, vec!["IEM"]);
        assert_eq!(config.gene_panels, vec!["IEM", "OMIM-AUTO"]);
        assert_eq!(config.rank_score_threshold, RANK_SCORE_THRESHOLD);
        assert_eq!(config.human_genome_build, "37");

        let child = &config.samples[0];
        assert_eq!(child.sample_id, "ADM1");
        assert_eq!(child.phenotype, "affected");
        assert_eq!(child.mother, "ADM2");
        assert_eq!(child.father, "ADM3");
        assert_eq!(child.bam_path, Some(PathBuf::from("/a/ADM1.bam")));
        assert_eq!(child.capture_kit.as_deref(), Some("agilent_sureselect_cre.v1"));

        let mother = &config.samples[1];
        assert_eq!(mother.sex, "female");
        assert_eq!(mother.father, "0");
        assert_eq!(mother.mother, "0");
    }

    #[test]
    fn test_load_config_yaml_skips_missing_files() {
        let config = build_load_config(&case(), "cust000", &trio(), &mip_analysis());
        let yaml = serde_yaml::to_string(&config).unwrap();

        assert!(yaml.contains("vcf_snv: /a/snv_clinical.vcf.gz"));
        assert!(!yaml.contains("vcf_sv_research"));
        assert!(!yaml.contains("vcf_str"));
    }

    #[test]
    fn test_load_command_line() {
        let api = VariantPortalApi::new(&ToolConfig {
            binary: "scout".to_string(),
            config: None,
        });
        assert_eq!(
            api.process().command_line(&["load", "config", "/a/scout_load_config.yaml"]),
            vec!["scout", "load", "config", "/a/scout_load_config.yaml"]
        );
    }
}

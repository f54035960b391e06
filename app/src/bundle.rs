// ==============================================================================
// bundle.rs - MIP DNA Analysis Bundle
// ==============================================================================
// Description: Collects tagged result files of a finished MIP DNA analysis
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// The parts of the MIP run config the bundle needs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MipConfig {
    pub case: String,
    pub config_path: PathBuf,
    pub sampleinfo_path: PathBuf,
    pub log_path: PathBuf,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VariantFiles {
    pub bcf: PathBuf,
    #[serde(default)]
    pub clinical_vcf: Option<PathBuf>,
    #[serde(default)]
    pub research_vcf: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeddyFiles {
    pub ped_check: PathBuf,
    pub ped: PathBuf,
    pub sex_check: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SampleFiles {
    pub id: String,
    pub sambamba: PathBuf,
    pub bam: PathBuf,
    #[serde(default)]
    pub subsample_mt: Option<PathBuf>,
    pub vcf2cytosure: PathBuf,
    #[serde(default)]
    pub capture_kit: Option<String>,
}

/// The parts of MIP's qc sample info the bundle and the portals need
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SampleInfo {
    pub date: NaiveDateTime,
    pub version: String,
    pub pedigree_path: PathBuf,
    pub qcmetrics_path: PathBuf,
    pub snv: VariantFiles,
    pub sv: VariantFiles,
    pub peddy: PeddyFiles,
    #[serde(default)]
    pub str_vcf: Option<PathBuf>,
    pub samples: Vec<SampleFiles>,
    #[serde(default)]
    pub genome_build: Option<String>,
    #[serde(default)]
    pub rank_model_version: Option<String>,
    #[serde(default)]
    pub sv_rank_model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleFile {
    pub path: PathBuf,
    pub tags: Vec<String>,
    pub archive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub name: String,
    pub created: NaiveDateTime,
    pub pipeline_version: String,
    pub files: Vec<BundleFile>,
}

impl BundleFile {
    pub fn has_tags(&self, tags: &[&str]) -> bool {
        tags.iter().all(|t| self.tags.iter().any(|ft| ft == t))
    }
}

impl Bundle {
    /// Files carrying every one of `tags`
    pub fn files_with_tags(&self, tags: &[&str]) -> Vec<&BundleFile> {
        self.files.iter().filter(|f| f.has_tags(tags)).collect()
    }

    pub fn first_with_tags(&self, tags: &[&str]) -> Option<&BundleFile> {
        self.files.iter().find(|f| f.has_tags(tags))
    }
}

/// A parsed MIP analysis: the two input documents and the resulting bundle
#[derive(Debug, Clone)]
pub struct MipAnalysis {
    pub config: MipConfig,
    pub sampleinfo: SampleInfo,
    pub bundle: Bundle,
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BundleError> {
    let content = std::fs::read_to_string(path).map_err(|source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| BundleError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// MIP writes `<case>_config.yaml` and `<case>_qc_sample_info.yaml` into
/// `<analysis_root>/<case>/analysis/`
pub fn case_analysis_dir(analysis_root: &Path, case_id: &str) -> PathBuf {
    analysis_root.join(case_id).join("analysis")
}

impl MipAnalysis {
    pub fn from_files(config_path: &Path, sampleinfo_path: &Path) -> Result<Self, BundleError> {
        let config: MipConfig = read_yaml(config_path)?;
        let sampleinfo: SampleInfo = read_yaml(sampleinfo_path)?;
        let bundle = build_bundle(&config, &sampleinfo);
        Ok(Self { config, sampleinfo, bundle })
    }

    pub fn load(analysis_root: &Path, case_id: &str) -> Result<Self, BundleError> {
        let dir = case_analysis_dir(analysis_root, case_id);
        Self::from_files(
            &dir.join(format!("{}_config.yaml", case_id)),
            &dir.join(format!("{}_qc_sample_info.yaml", case_id)),
        )
    }
}

pub fn build_bundle(config: &MipConfig, sampleinfo: &SampleInfo) -> Bundle {
    Bundle {
        name: config.case.clone(),
        created: sampleinfo.date,
        pipeline_version: sampleinfo.version.clone(),
        files: get_files(config, sampleinfo),
    }
}

fn file(path: impl Into<PathBuf>, tags: &[&str], archive: bool) -> BundleFile {
    BundleFile {
        path: path.into(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        archive,
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// `<bam>.bai` if present, otherwise `.bam` swapped for `.bai`
fn bam_index(bam: &Path) -> PathBuf {
    let bai = with_suffix(bam, ".bai");
    if bai.exists() {
        return bai;
    }
    PathBuf::from(bam.display().to_string().replace(".bam", ".bai"))
}

fn get_files(config: &MipConfig, info: &SampleInfo) -> Vec<BundleFile> {
    let mut files = vec![
        file(&config.config_path, &["mip-config"], true),
        file(&config.sampleinfo_path, &["sampleinfo"], true),
        file(&info.pedigree_path, &["pedigree"], false),
        file(&config.log_path, &["mip-log"], true),
        file(&info.qcmetrics_path, &["qcmetrics"], true),
        file(&info.snv.bcf, &["snv-bcf", "snv-gbcf"], true),
        file(with_suffix(&info.snv.bcf, ".csi"), &["snv-bcf-index", "snv-gbcf-index"], true),
        file(&info.sv.bcf, &["sv-bcf"], true),
        file(with_suffix(&info.sv.bcf, ".csi"), &["sv-bcf-index"], true),
        file(&info.peddy.ped_check, &["peddy", "ped-check"], false),
        file(&info.peddy.ped, &["peddy", "ped"], false),
        file(&info.peddy.sex_check, &["peddy", "sex-check"], false),
    ];

    if let Some(str_vcf) = &info.str_vcf {
        files.push(file(str_vcf, &["vcf-str"], true));
    }

    for (variant_type, variants, index_suffix) in [("snv", &info.snv, ".tbi"), ("sv", &info.sv, ".csi")] {
        for (output_type, vcf) in [("clinical", &variants.clinical_vcf), ("research", &variants.research_vcf)] {
            let Some(vcf) = vcf else {
                warn!("missing file: {} {} VCF", output_type, variant_type);
                continue;
            };
            let tag = format!("vcf-{}-{}", variant_type, output_type);
            let index_tag = format!("{}-index", tag);
            files.push(file(vcf, &[tag.as_str()], true));
            files.push(file(with_suffix(vcf, index_suffix), &[index_tag.as_str()], true));
        }
    }

    for sample in &info.samples {
        let id = sample.id.as_str();
        files.push(file(&sample.sambamba, &["coverage", id], false));
        files.push(file(&sample.bam, &["bam", id], false));
        files.push(file(bam_index(&sample.bam), &["bam-index", id], false));

        if let Some(mt_bam) = &sample.subsample_mt {
            files.push(file(mt_bam, &["bam-mt", id], false));
            files.push(file(bam_index(mt_bam), &["bam-mt-index", id], false));
        }

        files.push(file(&sample.vcf2cytosure, &["vcf2cytosure", id], false));
    }

    files
}

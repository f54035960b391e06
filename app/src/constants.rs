// ==============================================================================
// constants.rs - Domain Constants
// ==============================================================================
// Description: Priorities, actions, pipelines and orderform option sets
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Days a SPRING archive must stay unpacked before FASTQ can be removed again
pub const FASTQ_DELTA_DAYS: i64 = 21;

/// Sample name pattern enforced on orders
pub const NAME_PATTERN: &str = r"^[A-Za-z0-9-]*$";

/// Error for values outside a fixed option set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct UnknownOption {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownOption {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Case and sample priority. Stored as an integer in the status database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Research,
    Standard,
    Priority,
    Express,
    #[serde(alias = "clinical trials")]
    ClinicalTrials,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Research,
        Priority::Standard,
        Priority::Priority,
        Priority::Express,
        Priority::ClinicalTrials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Research => "research",
            Priority::Standard => "standard",
            Priority::Priority => "priority",
            Priority::Express => "express",
            Priority::ClinicalTrials => "clinical_trials",
        }
    }

    pub fn as_db(&self) -> i32 {
        match self {
            Priority::Research => 0,
            Priority::Standard => 1,
            Priority::Priority => 2,
            Priority::Express => 3,
            Priority::ClinicalTrials => 4,
        }
    }

    pub fn from_db(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_db() == value)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Standard
    }
}

impl FromStr for Priority {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "research" => Ok(Priority::Research),
            "standard" => Ok(Priority::Standard),
            "priority" => Ok(Priority::Priority),
            "express" => Ok(Priority::Express),
            "clinical_trials" | "clinical trials" => Ok(Priority::ClinicalTrials),
            _ => Err(UnknownOption::new("priority", s)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending action on a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseAction {
    Analyze,
    Running,
    Hold,
}

impl CaseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseAction::Analyze => "analyze",
            CaseAction::Running => "running",
            CaseAction::Hold => "hold",
        }
    }
}

impl FromStr for CaseAction {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyze" => Ok(CaseAction::Analyze),
            "running" => Ok(CaseAction::Running),
            "hold" => Ok(CaseAction::Hold),
            _ => Err(UnknownOption::new("case action", s)),
        }
    }
}

impl fmt::Display for CaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis pipelines known to the status database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pipeline {
    #[serde(rename = "balsamic")]
    Balsamic,
    #[serde(rename = "fastq")]
    Fastq,
    #[serde(rename = "fluffy")]
    Fluffy,
    #[serde(rename = "microsalt")]
    Microsalt,
    #[serde(rename = "mip-dna")]
    MipDna,
    #[serde(rename = "mip-rna")]
    MipRna,
    #[serde(rename = "sars-cov-2")]
    SarsCov2,
}

impl Pipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Balsamic => "balsamic",
            Pipeline::Fastq => "fastq",
            Pipeline::Fluffy => "fluffy",
            Pipeline::Microsalt => "microsalt",
            Pipeline::MipDna => "mip-dna",
            Pipeline::MipRna => "mip-rna",
            Pipeline::SarsCov2 => "sars-cov-2",
        }
    }
}

impl FromStr for Pipeline {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "balsamic" => Ok(Pipeline::Balsamic),
            "fastq" => Ok(Pipeline::Fastq),
            "fluffy" => Ok(Pipeline::Fluffy),
            "microsalt" => Ok(Pipeline::Microsalt),
            "mip-dna" | "mip" => Ok(Pipeline::MipDna),
            "mip-rna" => Ok(Pipeline::MipRna),
            "sars-cov-2" | "mutant" => Ok(Pipeline::SarsCov2),
            _ => Err(UnknownOption::new("pipeline", s)),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What gets delivered to the customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataDelivery {
    #[serde(rename = "analysis")]
    Analysis,
    #[serde(rename = "analysis-bam")]
    AnalysisBam,
    #[serde(rename = "fastq")]
    Fastq,
    #[serde(rename = "fastq_qc")]
    FastqQc,
    #[serde(rename = "nipt-viewer")]
    NiptViewer,
    #[serde(rename = "scout")]
    Scout,
    #[serde(rename = "fastq-analysis-scout")]
    FastqAnalysisScout,
}

impl DataDelivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataDelivery::Analysis => "analysis",
            DataDelivery::AnalysisBam => "analysis-bam",
            DataDelivery::Fastq => "fastq",
            DataDelivery::FastqQc => "fastq_qc",
            DataDelivery::NiptViewer => "nipt-viewer",
            DataDelivery::Scout => "scout",
            DataDelivery::FastqAnalysisScout => "fastq-analysis-scout",
        }
    }
}

impl FromStr for DataDelivery {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analysis" => Ok(DataDelivery::Analysis),
            "analysis-bam" => Ok(DataDelivery::AnalysisBam),
            "fastq" => Ok(DataDelivery::Fastq),
            "fastq_qc" => Ok(DataDelivery::FastqQc),
            "nipt-viewer" => Ok(DataDelivery::NiptViewer),
            "scout" => Ok(DataDelivery::Scout),
            "fastq-analysis-scout" => Ok(DataDelivery::FastqAnalysisScout),
            _ => Err(UnknownOption::new("data delivery", s)),
        }
    }
}

impl fmt::Display for DataDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pedigree sex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Unknown => "unknown",
        }
    }

    /// Pedigree code used in portal load configs
    pub fn ped_code(&self) -> u8 {
        match self {
            Sex::Male => 1,
            Sex::Female => 2,
            Sex::Unknown => 0,
        }
    }
}

impl FromStr for Sex {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            "unknown" => Ok(Sex::Unknown),
            _ => Err(UnknownOption::new("sex", s)),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phenotype status of a sample within a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhenotypeStatus {
    Affected,
    Unaffected,
    Unknown,
}

impl PhenotypeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhenotypeStatus::Affected => "affected",
            PhenotypeStatus::Unaffected => "unaffected",
            PhenotypeStatus::Unknown => "unknown",
        }
    }
}

impl FromStr for PhenotypeStatus {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "affected" => Ok(PhenotypeStatus::Affected),
            "unaffected" => Ok(PhenotypeStatus::Unaffected),
            "unknown" => Ok(PhenotypeStatus::Unknown),
            _ => Err(UnknownOption::new("status", s)),
        }
    }
}

impl fmt::Display for PhenotypeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality of service for SLURM jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlurmQos {
    Low,
    Normal,
    High,
    Express,
}

impl SlurmQos {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlurmQos::Low => "low",
            SlurmQos::Normal => "normal",
            SlurmQos::High => "high",
            SlurmQos::Express => "express",
        }
    }
}

impl Default for SlurmQos {
    fn default() -> Self {
        SlurmQos::Low
    }
}

impl FromStr for SlurmQos {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(SlurmQos::Low),
            "normal" => Ok(SlurmQos::Normal),
            "high" => Ok(SlurmQos::High),
            "express" => Ok(SlurmQos::Express),
            _ => Err(UnknownOption::new("slurm qos", s)),
        }
    }
}

impl fmt::Display for SlurmQos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample containers accepted on orders
pub const CONTAINER_OPTIONS: &[&str] = &["Tube", "96 well plate", "No container"];

/// Capture kits for exome/panel orders
pub const CAPTUREKIT_OPTIONS: &[&str] = &[
    "Agilent Sureselect CRE",
    "Agilent Sureselect V5",
    "SureSelect Focused Exome",
    "Twist_Target_hg19.bed",
    "other",
];

/// Sample source types recognised by the LIMS
pub const SOURCE_TYPES: &[&str] = &[
    "blood",
    "buccal swab",
    "cell-free DNA",
    "cell line",
    "cytology (FFPE)",
    "cytology (not fixed/fresh)",
    "muscle",
    "nail",
    "other",
    "saliva",
    "skin",
    "tissue (FFPE)",
    "tissue (fresh frozen)",
    "bone marrow",
    "amniotic fluid",
    "fibroblast",
    "CVB",
    "nasopharyngeal swab",
    "unknown",
];

// ==============================================================================
// gisaid.rs - GISAID Submission Files
// ==============================================================================
// Description: Builds the GISAID CSV and FASTA for a SARS-CoV-2 case
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::UploadError;

pub const HEADERS: [&str; 18] = [
    "submitter",
    "fn",
    "covv_virus_name",
    "covv_type",
    "covv_passage",
    "covv_collection_date",
    "covv_location",
    "covv_host",
    "covv_gender",
    "covv_patient_age",
    "covv_patient_status",
    "covv_seq_technology",
    "covv_orig_lab",
    "covv_orig_lab_addr",
    "covv_provider_sample_id",
    "covv_subm_lab",
    "covv_subm_lab_addr",
    "covv_authors",
];

pub const AUTHORS: [&str; 14] = [
    "Jan Albert",
    "Tobias Allander",
    "Annelie Bjerkner",
    "Sandra Broddesson",
    "Robert Dyrdak",
    "Martin Ekman",
    "Lynda Eneh",
    "Lina Guerra Blomqvist",
    "Karolina Ininbergs",
    "Tanja Normark",
    "Isak Sylvin",
    "Zhibing Yun",
    "Martina Wahlund",
    "Valtteri Wirta",
];

const SUBMITTING_LAB: &str = "Karolinska University Hospital";
const SUBMITTING_LAB_ADDRESS: &str = "171 76 Stockholm, Sweden";

/// One entry of mutant's `case_config.json`
#[derive(Debug, Clone, Deserialize)]
pub struct MutantSample {
    #[serde(rename = "CG_ID_sample")]
    pub internal_id: String,
    #[serde(rename = "Customer_ID_sample")]
    pub name: String,
    #[serde(default)]
    pub region_code: Option<String>,
    #[serde(default)]
    pub lab_code: Option<String>,
    #[serde(default)]
    pub date_arrival: Option<String>,
}

/// A sample ready for submission
#[derive(Debug, Clone, PartialEq)]
pub struct GisaidSample {
    pub internal_id: String,
    pub name: String,
    pub region: String,
    pub lab: String,
    pub lab_name: String,
    pub collection_date: NaiveDate,
}

impl GisaidSample {
    pub fn virus_name(&self) -> String {
        format!(
            "hCoV-19/Sweden/{}_{}_{}/{}",
            self.region,
            self.lab,
            self.name,
            self.collection_date.year()
        )
    }
}

/// Column order follows `HEADERS`
#[derive(Debug, Clone, Serialize)]
pub struct GisaidRow {
    pub submitter: String,
    #[serde(rename = "fn")]
    pub fasta_name: String,
    pub covv_virus_name: String,
    pub covv_type: &'static str,
    pub covv_passage: &'static str,
    pub covv_collection_date: String,
    pub covv_location: &'static str,
    pub covv_host: &'static str,
    pub covv_gender: &'static str,
    pub covv_patient_age: &'static str,
    pub covv_patient_status: &'static str,
    pub covv_seq_technology: &'static str,
    pub covv_orig_lab: String,
    pub covv_orig_lab_addr: &'static str,
    pub covv_provider_sample_id: String,
    pub covv_subm_lab: &'static str,
    pub covv_subm_lab_addr: &'static str,
    pub covv_authors: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GisaidFiles {
    pub csv: PathBuf,
    pub fasta: PathBuf,
}

/// `"SE110 Växjö"` is submitted as `SE110`
fn first_word(value: &str) -> &str {
    value.split_whitespace().next().unwrap_or("")
}

fn collection_date(sample: &MutantSample) -> Result<NaiveDate, UploadError> {
    let raw = sample.date_arrival.as_deref().unwrap_or("");
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            UploadError::Gisaid(format!(
                "sample {} has no valid arrival date: '{}'",
                sample.internal_id, raw
            ))
        })
}

impl TryFrom<&MutantSample> for GisaidSample {
    type Error = UploadError;

    fn try_from(sample: &MutantSample) -> Result<Self, Self::Error> {
        let missing = |field: &str| {
            UploadError::Gisaid(format!("sample {} is missing {}", sample.internal_id, field))
        };
        let region = sample.region_code.as_deref().ok_or_else(|| missing("region_code"))?;
        let lab = sample.lab_code.as_deref().ok_or_else(|| missing("lab_code"))?;

        Ok(GisaidSample {
            internal_id: sample.internal_id.clone(),
            name: sample.name.clone(),
            region: first_word(region).to_string(),
            lab: first_word(lab).to_string(),
            lab_name: lab.to_string(),
            collection_date: collection_date(sample)?,
        })
    }
}

pub struct GisaidApi {
    mutant_root: PathBuf,
    submitter: String,
}

impl GisaidApi {
    pub fn new(mutant_root: impl Into<PathBuf>, submitter: impl Into<String>) -> Self {
        Self {
            mutant_root: mutant_root.into(),
            submitter: submitter.into(),
        }
    }

    pub fn case_dir(&self, case_id: &str) -> PathBuf {
        self.mutant_root.join(case_id)
    }

    pub fn consensus_path(&self, case_id: &str, sample_id: &str) -> PathBuf {
        self.case_dir(case_id)
            .join("results")
            .join("consensus")
            .join(format!("{}.consensus.fa", sample_id))
    }

    pub fn gisaid_samples(&self, case_id: &str) -> Result<Vec<GisaidSample>, UploadError> {
        let config_path = self.case_dir(case_id).join("case_config.json");
        if !config_path.exists() {
            return Err(UploadError::Gisaid(format!(
                "no mutant case config for {} at {}",
                case_id,
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(&config_path)?;
        let samples: Vec<MutantSample> = serde_json::from_str(&content)?;
        if samples.is_empty() {
            return Err(UploadError::Gisaid(format!("case {} has no samples", case_id)));
        }

        samples.iter().map(GisaidSample::try_from).collect()
    }

    pub fn build_rows(&self, samples: &[GisaidSample], fasta_name: &str) -> Vec<GisaidRow> {
        let authors = AUTHORS.join(", ");
        samples
            .iter()
            .map(|sample| GisaidRow {
                submitter: self.submitter.clone(),
                fasta_name: fasta_name.to_string(),
                covv_virus_name: sample.virus_name(),
                covv_type: "betacoronavirus",
                covv_passage: "Original",
                covv_collection_date: sample.collection_date.format("%Y-%m-%d").to_string(),
                covv_location: "Europe / Sweden",
                covv_host: "Human",
                covv_gender: "unknown",
                covv_patient_age: "unknown",
                covv_patient_status: "unknown",
                covv_seq_technology: "Illumina NovaSeq",
                covv_orig_lab: sample.lab_name.clone(),
                covv_orig_lab_addr: "Sweden",
                covv_provider_sample_id: sample.name.clone(),
                covv_subm_lab: SUBMITTING_LAB,
                covv_subm_lab_addr: SUBMITTING_LAB_ADDRESS,
                covv_authors: authors.clone(),
            })
            .collect()
    }

    pub fn write_csv(&self, path: &Path, rows: &[GisaidRow]) -> Result<(), UploadError> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Concatenate the consensus sequences with their headers replaced by
    /// the virus names
    pub fn build_fasta(&self, case_id: &str, samples: &[GisaidSample]) -> Result<String, UploadError> {
        let mut fasta = String::new();

        for sample in samples {
            let path = self.consensus_path(case_id, &sample.internal_id);
            let content = std::fs::read_to_string(&path).map_err(|_| UploadError::MissingFile {
                sample: sample.internal_id.clone(),
                tag: "consensus".to_string(),
            })?;
            fasta.push_str(&rewrite_headers(&content, &sample.virus_name()));
        }

        Ok(fasta)
    }

    pub fn build_files(&self, case_id: &str) -> Result<GisaidFiles, UploadError> {
        let samples = self.gisaid_samples(case_id)?;
        let case_dir = self.case_dir(case_id);

        let fasta_name = format!("{}.fasta", case_id);
        let files = GisaidFiles {
            csv: case_dir.join(format!("{}.csv", case_id)),
            fasta: case_dir.join(&fasta_name),
        };

        std::fs::write(&files.fasta, self.build_fasta(case_id, &samples)?)?;
        self.write_csv(&files.csv, &self.build_rows(&samples, &fasta_name))?;

        info!(
            "Wrote GISAID files for {} samples: {} and {}",
            samples.len(),
            files.csv.display(),
            files.fasta.display()
        );
        Ok(files)
    }
}

fn rewrite_headers(content: &str, virus_name: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut headers = 0;
    for line in content.lines() {
        if line.starts_with('>') {
            headers += 1;
            out.push('>');
            out.push_str(virus_name);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    if headers != 1 {
        warn!("Expected one sequence for {}, found {}", virus_name, headers);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_case(root: &Path, case_id: &str, config: &str) {
        let consensus = root.join(case_id).join("results").join("consensus");
        std::fs::create_dir_all(&consensus).unwrap();
        std::fs::write(root.join(case_id).join("case_config.json"), config).unwrap();
        std::fs::write(consensus.join("ACC1.consensus.fa"), ">ACC1_ivar\nACGTNNACGT\nACGT\n").unwrap();
    }

    const CONFIG: &str = r#"[
        {
            "CG_ID_sample": "ACC1",
            "Customer_ID_sample": "sample1",
            "region_code": "01 (Stockholm)",
            "lab_code": "SE110 Växjö",
            "date_arrival": "2026-09-14 10:00:00"
        }
    ]"#;

    #[test]
    fn test_virus_name() {
        let sample = GisaidSample::try_from(&MutantSample {
            internal_id: "ACC1".to_string(),
            name: "sample1".to_string(),
            region_code: Some("01 (Stockholm)".to_string()),
            lab_code: Some("SE110 Växjö".to_string()),
            date_arrival: Some("2026-09-14 10:00:00".to_string()),
        })
        .unwrap();

        assert_eq!(sample.virus_name(), "hCoV-19/Sweden/01_SE110_sample1/2026");
        assert_eq!(sample.lab_name, "SE110 Växjö");
    }

    #[test]
    fn test_missing_arrival_date_is_an_error() {
        let result = GisaidSample::try_from(&MutantSample {
            internal_id: "ACC1".to_string(),
            name: "sample1".to_string(),
            region_code: Some("01".to_string()),
            lab_code: Some("SE110".to_string()),
            date_arrival: Some("None".to_string()),
        });
        assert!(matches!(result, Err(UploadError::Gisaid(_))));
    }

    #[test]
    fn test_rewrite_headers() {
        let fasta = rewrite_headers(">ACC1_ivar\nACGT\n", "hCoV-19/Sweden/01_SE110_sample1/2026");
        assert_eq!(fasta, ">hCoV-19/Sweden/01_SE110_sample1/2026\nACGT\n");
    }

    #[test]
    fn test_build_files() {
        let temp = TempDir::new().unwrap();
        write_case(temp.path(), "happycat", CONFIG);
        let api = GisaidApi::new(temp.path(), "jdoe");

        let files = api.build_files("happycat").unwrap();

        let fasta = std::fs::read_to_string(&files.fasta).unwrap();
        assert!(fasta.starts_with(">hCoV-19/Sweden/01_SE110_sample1/2026\nACGTNNACGT"));

        let mut reader = csv::Reader::from_path(&files.csv).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, HEADERS.to_vec());

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "jdoe");
        assert_eq!(&rows[0][1], "happycat.fasta");
        assert_eq!(&rows[0][5], "2026-09-14");
        assert!(rows[0][17].starts_with("Jan Albert, Tobias Allander"));
    }

    #[test]
    fn test_missing_case_is_an_error() {
        let temp = TempDir::new().unwrap();
        let api = GisaidApi::new(temp.path(), "jdoe");
        assert!(matches!(api.build_files("nocase"), Err(UploadError::Gisaid(_))));
    }

    #[test]
    fn test_empty_case_is_an_error() {
        let temp = TempDir::new().unwrap();
        write_case(temp.path(), "happycat", "[]");
        let api = GisaidApi::new(temp.path(), "jdoe");
        assert!(matches!(api.build_files("happycat"), Err(UploadError::Gisaid(_))));
    }

    #[test]
    fn test_missing_consensus_is_an_error() {
        let temp = TempDir::new().unwrap();
        write_case(temp.path(), "happycat", &CONFIG.replace("ACC1", "ACC2"));
        let api = GisaidApi::new(temp.path(), "jdoe");
        assert!(matches!(
            api.build_files("happycat"),
            Err(UploadError::MissingFile { .. })
        ));
    }
}

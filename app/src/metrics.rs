// ==============================================================================
// metrics.rs - MIP QC Metrics Deliverables
// ==============================================================================
// Description: Parses metrics_deliverables.yaml into per-sample QC metrics
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::Sex;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Invalid metrics deliverables: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Sample {sample_id} has no {metric} metric")]
    MissingMetric { sample_id: String, metric: &'static str },

    #[error("Metric {metric} for {sample_id} is not a number: {value}")]
    NotNumeric {
        sample_id: String,
        metric: String,
        value: String,
    },

    #[error("Sample {0} has no reads in raw_total_sequences")]
    NoSequences(String),
}

/// One raw entry of the deliverables file
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsBase {
    #[serde(default)]
    pub header: Option<String>,
    pub id: String,
    pub input: String,
    pub name: String,
    pub step: String,
    pub value: serde_yaml::Value,
}

impl MetricsBase {
    fn as_f64(&self) -> Result<f64, MetricsError> {
        let parsed = match &self.value {
            serde_yaml::Value::Number(n) => n.as_f64(),
            serde_yaml::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| MetricsError::NotNumeric {
            sample_id: self.id.clone(),
            metric: self.name.clone(),
            value: format!("{:?}", self.value),
        })
    }

    fn as_text(&self) -> String {
        match &self.value {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Null => String::new(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDeliverables {
    metrics: Vec<MetricsBase>,
}

/// A value together with the MIP step that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepValue<T> {
    pub value: T,
    pub step: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedMetrics {
    pub sample_id: String,
    pub duplicate_reads: f64,
    pub duplicate_reads_step: String,
    pub mapped_reads: f64,
    pub mapped_reads_step: String,
    pub mean_insert_size: i64,
    pub mean_insert_size_step: String,
    pub median_target_coverage: i64,
    pub median_target_coverage_step: String,
    pub predicted_sex: String,
    pub predicted_sex_step: String,
}

#[derive(Debug, Clone)]
pub struct MetricsDeliverables {
    pub metrics: Vec<MetricsBase>,
}

impl MetricsDeliverables {
    pub fn from_yaml(content: &str) -> Result<Self, MetricsError> {
        let raw: RawDeliverables = serde_yaml::from_str(content)?;
        Ok(Self { metrics: raw.metrics })
    }

    pub fn sample_ids(&self) -> BTreeSet<String> {
        self.metrics.iter().map(|m| m.id.clone()).collect()
    }

    fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MetricsBase> + 'a {
        self.metrics.iter().filter(move |m| m.name == name)
    }

    /// Fraction duplicates as percent
    pub fn duplicate_reads(&self) -> Result<BTreeMap<String, StepValue<f64>>, MetricsError> {
        let mut out = BTreeMap::new();
        for m in self.named("fraction_duplicates") {
            out.insert(m.id.clone(), StepValue { value: m.as_f64()? * 100.0, step: m.step.clone() });
        }
        Ok(out)
    }

    /// Mapped reads as percent of raw total sequences, summed per sample
    pub fn mapped_reads(&self) -> Result<BTreeMap<String, StepValue<f64>>, MetricsError> {
        let mut total: BTreeMap<&str, i64> = BTreeMap::new();
        let mut mapped: BTreeMap<&str, i64> = BTreeMap::new();
        let mut step = String::new();

        for m in &self.metrics {
            match m.name.as_str() {
                "raw_total_sequences" => {
                    *total.entry(m.id.as_str()).or_default() += m.as_f64()? as i64;
                    step = m.step.clone();
                }
                "reads_mapped" => {
                    *mapped.entry(m.id.as_str()).or_default() += m.as_f64()? as i64;
                }
                _ => {}
            }
        }

        let mut out = BTreeMap::new();
        for sample_id in self.sample_ids() {
            let Some(&sequences) = total.get(sample_id.as_str()) else {
                continue;
            };
            if sequences == 0 {
                return Err(MetricsError::NoSequences(sample_id));
            }
            let reads = mapped.get(sample_id.as_str()).copied().unwrap_or(0);
            out.insert(
                sample_id,
                StepValue { value: reads as f64 / sequences as f64 * 100.0, step: step.clone() },
            );
        }
        Ok(out)
    }

    pub fn mean_insert_size(&self) -> Result<BTreeMap<String, StepValue<i64>>, MetricsError> {
        let mut out = BTreeMap::new();
        for m in self.named("MEAN_INSERT_SIZE") {
            out.insert(m.id.clone(), StepValue { value: m.as_f64()?.trunc() as i64, step: m.step.clone() });
        }
        Ok(out)
    }

    pub fn median_target_coverage(&self) -> Result<BTreeMap<String, StepValue<i64>>, MetricsError> {
        let mut out = BTreeMap::new();
        for m in self.named("MEDIAN_TARGET_COVERAGE") {
            out.insert(m.id.clone(), StepValue { value: m.as_f64()? as i64, step: m.step.clone() });
        }
        Ok(out)
    }

    pub fn predicted_sex(&self) -> BTreeMap<String, StepValue<String>> {
        self.named("gender")
            .map(|m| (m.id.clone(), StepValue { value: m.as_text(), step: m.step.clone() }))
            .collect()
    }

    /// Parsed metrics for every sample in the file
    pub fn sample_id_metrics(&self) -> Result<Vec<ParsedMetrics>, MetricsError> {
        let duplicates = self.duplicate_reads()?;
        let mapped = self.mapped_reads()?;
        let insert_size = self.mean_insert_size()?;
        let coverage = self.median_target_coverage()?;
        let sex = self.predicted_sex();

        fn take<T: Clone>(
            map: &BTreeMap<String, StepValue<T>>,
            sample_id: &str,
            metric: &'static str,
        ) -> Result<StepValue<T>, MetricsError> {
            map.get(sample_id).cloned().ok_or_else(|| MetricsError::MissingMetric {
                sample_id: sample_id.to_string(),
                metric,
            })
        }

        self.sample_ids()
            .into_iter()
            .map(|sample_id| {
                let duplicate_reads = take(&duplicates, &sample_id, "duplicate_reads")?;
                let mapped_reads = take(&mapped, &sample_id, "mapped_reads")?;
                let mean_insert_size = take(&insert_size, &sample_id, "mean_insert_size")?;
                let median_target_coverage = take(&coverage, &sample_id, "median_target_coverage")?;
                let (predicted_sex, predicted_sex_step) = match sex.get(&sample_id) {
                    Some(s) if !s.value.is_empty() => (s.value.clone(), s.step.clone()),
                    _ => (Sex::Unknown.to_string(), String::new()),
                };

                Ok(ParsedMetrics {
                    sample_id,
                    duplicate_reads: duplicate_reads.value,
                    duplicate_reads_step: duplicate_reads.step,
                    mapped_reads: mapped_reads.value,
                    mapped_reads_step: mapped_reads.step,
                    mean_insert_size: mean_insert_size.value,
                    mean_insert_size_step: mean_insert_size.step,
                    median_target_coverage: median_target_coverage.value,
                    median_target_coverage_step: median_target_coverage.step,
                    predicted_sex,
                    predicted_sex_step,
                })
            })
            .collect()
    }
}

pub fn get_sample_id_metric<'a>(metrics: &'a [ParsedMetrics], sample_id: &str) -> Option<&'a ParsedMetrics> {
    metrics.iter().find(|m| m.sample_id == sample_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIVERABLES: &str = r#"
metrics:
  - header: ~
    id: ADM1
    input: ADM1_lanes_1_sorted_md.metrics
    name: fraction_duplicates
    step: markduplicates
    value: 0.0734
  - header: ~
    id: ADM1
    input: ADM1_lanes_1_sorted_md_stats
    name: raw_total_sequences
    step: samtools_stats
    value: 1000
  - header: ~
    id: ADM1
    input: ADM1_lanes_2_sorted_md_stats
    name: raw_total_sequences
    step: samtools_stats
    value: 1000
  - header: ~
    id: ADM1
    input: ADM1_lanes_1_sorted_md_stats
    name: reads_mapped
    step: samtools_stats
    value: 900
  - header: ~
    id: ADM1
    input: ADM1_lanes_2_sorted_md_stats
    name: reads_mapped
    step: samtools_stats
    value: 1000
  - header: ~
    id: ADM1
    input: ADM1_collectmultiplemetrics
    name: MEAN_INSERT_SIZE
    step: collectmultiplemetrics
    value: '412.8'
  - header: ~
    id: ADM1
    input: ADM1_collecthsmetrics
    name: MEDIAN_TARGET_COVERAGE
    step: collecthsmetrics
    value: 38
  - header: ~
    id: ADM1
    input: case.ped
    name: gender
    step: chanjo_sexcheck
    value: female
"#;

    #[test]
    fn test_sample_ids() {
        let deliverables = MetricsDeliverables::from_yaml(DELIVERABLES).unwrap();
        assert_eq!(deliverables.sample_ids().into_iter().collect::<Vec<_>>(), vec!["ADM1"]);
    }

    #[test]
    fn test_parsed_metrics() {
        let deliverables = MetricsDeliverables::from_yaml(DELIVERABLES).unwrap();
        let metrics = deliverables.sample_id_metrics().unwrap();
        let adm1 = get_sample_id_metric(&metrics, "ADM1").unwrap();

        assert!((adm1.duplicate_reads - 7.34).abs() < 1e-9);
        assert!((adm1.mapped_reads - 95.0).abs() < 1e-9);
        assert_eq!(adm1.mapped_reads_step, "samtools_stats");
        assert_eq!(adm1.mean_insert_size, 412);
        assert_eq!(adm1.median_target_coverage, 38);
        assert_eq!(adm1.predicted_sex, "female");
        assert!(get_sample_id_metric(&metrics, "ADM2").is_none());
    }

    #[test]
    fn test_missing_sex_defaults_to_unknown() {
        let content = DELIVERABLES.replace("name: gender", "name: something_else");
        let metrics = MetricsDeliverables::from_yaml(&content).unwrap().sample_id_metrics().unwrap();
        assert_eq!(metrics[0].predicted_sex, "unknown");
    }

    #[test]
    fn test_missing_required_metric() {
        let content = DELIVERABLES.replace("name: MEDIAN_TARGET_COVERAGE", "name: PCT_TARGET_BASES_10X");
        let err = MetricsDeliverables::from_yaml(&content).unwrap().sample_id_metrics().unwrap_err();
        assert!(matches!(err, MetricsError::MissingMetric { metric: "median_target_coverage", .. }));
    }
}

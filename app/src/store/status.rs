// ==============================================================================
// status.rs - Status Database Work Queues
// ==============================================================================
// Description: Samples, cases and analyses waiting on the next lab or
//              analysis step, plus the per-case progress summary
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{Store, StoreError};
use crate::constants::{CaseAction, Pipeline, Priority};
use crate::models::{Analysis, Family, Sample};

/// Lab and analysis stages a case moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Received,
    Prepared,
    Sequenced,
    Analysed,
    Uploaded,
    Delivered,
    Invoiced,
}

/// A case sample with the application flags needed to decide what is due
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SampleProgress {
    pub family_id: i32,
    pub internal_id: String,
    pub is_external: bool,
    pub downsampled_to: Option<i64>,
    pub received_at: Option<DateTime<Utc>>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub sequenced_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub invoiced_at: Option<DateTime<Utc>>,
}

/// Progress of one stage: how many samples are due, how many are done, and
/// the latest timestamp once all of them are
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageProgress {
    pub total: usize,
    pub done: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageProgress {
    fn tally(dates: impl Iterator<Item = Option<DateTime<Utc>>>) -> Self {
        let mut progress = StageProgress::default();
        let mut latest: Option<DateTime<Utc>> = None;
        for date in dates {
            progress.total += 1;
            if let Some(date) = date {
                progress.done += 1;
                latest = latest.max(Some(date));
            }
        }
        if progress.total > 0 && progress.done == progress.total {
            progress.completed_at = latest;
        }
        progress
    }

    /// `None` when nothing is due, otherwise whether everything is done
    pub fn is_done(&self) -> Option<bool> {
        (self.total > 0).then_some(self.done == self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseStatus {
    pub internal_id: String,
    pub name: String,
    pub customer_id: i32,
    pub data_analysis: String,
    pub action: Option<String>,
    pub priority: Priority,
    pub ordered_at: DateTime<Utc>,
    pub sample_ids: Vec<String>,
    pub received: StageProgress,
    pub prepared: StageProgress,
    pub sequenced: StageProgress,
    pub delivered: StageProgress,
    pub invoiced: StageProgress,
    pub analysis_pipeline: Option<String>,
    pub analysis_started_at: Option<DateTime<Utc>>,
    pub analysis_completed_at: Option<DateTime<Utc>>,
    pub analysis_uploaded_at: Option<DateTime<Utc>>,
    pub received_bool: Option<bool>,
    pub prepared_bool: Option<bool>,
    pub sequenced_bool: Option<bool>,
    pub analysed_bool: Option<bool>,
    pub uploaded_bool: Option<bool>,
    pub delivered_bool: Option<bool>,
    pub invoiced_bool: Option<bool>,
}

impl CaseStatus {
    /// Aggregate the stage progress of a case from its samples
    pub fn summarize(case: &Family, samples: &[SampleProgress], latest_analysis: Option<&Analysis>) -> Self {
        let internal = || samples.iter().filter(|s| !s.is_external);

        let received = StageProgress::tally(samples.iter().map(|s| s.received_at));
        let prepared = StageProgress::tally(internal().map(|s| s.prepared_at));
        let sequenced = StageProgress::tally(internal().map(|s| s.sequenced_at));
        let delivered = StageProgress::tally(samples.iter().map(|s| s.delivered_at));
        let invoiced = StageProgress::tally(
            samples
                .iter()
                .filter(|s| s.downsampled_to.is_none())
                .map(|s| s.invoiced_at),
        );

        let analysed_bool = latest_analysis.map(|a| a.completed_at.is_some());
        let uploaded_bool = latest_analysis.map(|a| a.uploaded_at.is_some());

        CaseStatus {
            internal_id: case.internal_id.clone(),
            name: case.name.clone(),
            customer_id: case.customer_id,
            data_analysis: case.data_analysis.clone(),
            action: case.action.clone(),
            priority: case.priority_human(),
            ordered_at: case.ordered_at,
            sample_ids: samples.iter().map(|s| s.internal_id.clone()).collect(),
            received_bool: received.is_done(),
            prepared_bool: prepared.is_done(),
            sequenced_bool: sequenced.is_done(),
            analysed_bool,
            uploaded_bool,
            delivered_bool: delivered.is_done(),
            invoiced_bool: invoiced.is_done(),
            received,
            prepared,
            sequenced,
            delivered,
            invoiced,
            analysis_pipeline: latest_analysis.map(|a| a.pipeline.clone()),
            analysis_started_at: latest_analysis.and_then(|a| a.started_at),
            analysis_completed_at: latest_analysis.and_then(|a| a.completed_at),
            analysis_uploaded_at: latest_analysis.and_then(|a| a.uploaded_at),
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<bool> {
        match stage {
            Stage::Received => self.received_bool,
            Stage::Prepared => self.prepared_bool,
            Stage::Sequenced => self.sequenced_bool,
            Stage::Analysed => self.analysed_bool,
            Stage::Uploaded => self.uploaded_bool,
            Stage::Delivered => self.delivered_bool,
            Stage::Invoiced => self.invoiced_bool,
        }
    }
}

/// Filters for the case overview
#[derive(Debug, Clone)]
pub struct CaseFilters {
    pub days: i64,
    pub internal_id: Option<String>,
    pub name: Option<String>,
    pub action: Option<CaseAction>,
    pub priority: Option<Priority>,
    pub customer_id: Option<i32>,
    pub exclude_customer_id: Option<i32>,
    pub data_analysis: Option<Pipeline>,
    pub sample_id: Option<String>,
    /// Keep only cases where these stages are done
    pub only: BTreeSet<Stage>,
    /// Drop cases where these stages are done
    pub exclude: BTreeSet<Stage>,
}

impl Default for CaseFilters {
    fn default() -> Self {
        Self {
            days: 31,
            internal_id: None,
            name: None,
            action: None,
            priority: None,
            customer_id: None,
            exclude_customer_id: None,
            data_analysis: None,
            sample_id: None,
            only: BTreeSet::new(),
            exclude: BTreeSet::new(),
        }
    }
}

impl CaseFilters {
    pub fn matches(&self, status: &CaseStatus) -> bool {
        if let Some(id) = &self.internal_id {
            if !status.internal_id.contains(id.as_str()) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !status.name.contains(name.as_str()) {
                return false;
            }
        }
        if let Some(action) = self.action {
            if status.action.as_deref() != Some(action.as_str()) {
                return false;
            }
        }
        if self.priority.is_some_and(|p| p != status.priority) {
            return false;
        }
        if self.customer_id.is_some_and(|id| id != status.customer_id) {
            return false;
        }
        if self.exclude_customer_id == Some(status.customer_id) {
            return false;
        }
        if let Some(pipeline) = self.data_analysis {
            if status.data_analysis != pipeline.as_str() {
                return false;
            }
        }
        if let Some(sample_id) = &self.sample_id {
            if !status.sample_ids.iter().any(|s| s == sample_id) {
                return false;
            }
        }
        if self.only.iter().any(|stage| status.stage(*stage) != Some(true)) {
            return false;
        }
        if self.exclude.iter().any(|stage| status.stage(*stage) == Some(true)) {
            return false;
        }
        true
    }
}

impl Store {
    pub async fn samples_to_receive(&self, external: bool) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT s.* FROM sample s
            JOIN application_version v ON v.id = s.application_version_id
            JOIN application a ON a.id = v.application_id
            WHERE s.received_at IS NULL AND a.is_external = $1
            ORDER BY s.ordered_at
            "#,
        )
        .bind(external)
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }

    pub async fn samples_to_prepare(&self) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT s.* FROM sample s
            JOIN application_version v ON v.id = s.application_version_id
            JOIN application a ON a.id = v.application_id
            WHERE s.received_at IS NOT NULL
              AND s.prepared_at IS NULL
              AND NOT a.is_external
            ORDER BY s.priority DESC, s.received_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }

    /// Received samples not yet sequenced, partially sequenced ones included
    pub async fn samples_to_sequence(&self) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT s.* FROM sample s
            JOIN application_version v ON v.id = s.application_version_id
            JOIN application a ON a.id = v.application_id
            WHERE s.received_at IS NOT NULL
              AND s.sequenced_at IS NULL
              AND NOT a.is_external
            ORDER BY s.priority DESC, s.received_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }

    pub async fn samples_to_deliver(&self) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT * FROM sample
            WHERE sequenced_at IS NOT NULL AND delivered_at IS NULL
            ORDER BY sequenced_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }

    pub async fn samples_to_invoice(&self, customer_id: Option<i32>) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT * FROM sample
            WHERE delivered_at IS NOT NULL
              AND invoice_id IS NULL
              AND downsampled_to IS NULL
              AND ($1::INTEGER IS NULL OR customer_id = $1)
            ORDER BY delivered_at
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }

    /// Cases flagged for analysis plus untouched cases whose samples are all
    /// sequenced
    pub async fn cases_to_analyze(&self, pipeline: Option<Pipeline>) -> Result<Vec<Family>, StoreError> {
        let families = sqlx::query_as::<_, Family>(
            r#"
            SELECT f.* FROM family f
            WHERE ($1::TEXT IS NULL OR f.data_analysis = $1)
              AND (
                f.action = 'analyze'
                OR (
                  f.action IS NULL
                  AND NOT EXISTS (SELECT 1 FROM analysis a WHERE a.family_id = f.id)
                  AND EXISTS (SELECT 1 FROM family_sample fs WHERE fs.family_id = f.id)
                  AND NOT EXISTS (
                    SELECT 1 FROM family_sample fs
                    JOIN sample s ON s.id = fs.sample_id
                    WHERE fs.family_id = f.id AND s.sequenced_at IS NULL
                  )
                )
              )
            ORDER BY f.priority DESC, f.ordered_at
            "#,
        )
        .bind(pipeline.map(|p| p.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(families)
    }

    /// Completed analyses nobody has started uploading, on idle cases
    pub async fn analyses_to_upload(&self, pipeline: Option<Pipeline>) -> Result<Vec<Analysis>, StoreError> {
        let analyses = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT a.* FROM analysis a
            JOIN family f ON f.id = a.family_id
            WHERE a.completed_at IS NOT NULL
              AND a.uploaded_at IS NULL
              AND a.upload_started_at IS NULL
              AND f.action IS NULL
              AND ($1::TEXT IS NULL OR a.pipeline = $1)
            ORDER BY a.completed_at
            "#,
        )
        .bind(pipeline.map(|p| p.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(analyses)
    }

    pub async fn analyses_to_delivery_report(&self) -> Result<Vec<Analysis>, StoreError> {
        let analyses = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT * FROM analysis
            WHERE delivered_at IS NOT NULL
              AND (delivery_report_created_at IS NULL OR delivery_report_created_at < delivered_at)
            ORDER BY delivered_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(analyses)
    }

    /// Uploads started before `older_than` that never finished
    pub async fn stuck_uploads(&self, older_than: DateTime<Utc>) -> Result<Vec<Analysis>, StoreError> {
        let analyses = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT * FROM analysis
            WHERE upload_started_at < $1 AND uploaded_at IS NULL
            ORDER BY upload_started_at
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        Ok(analyses)
    }

    /// Progress overview of recently ordered cases
    pub async fn cases(&self, filters: &CaseFilters) -> Result<Vec<CaseStatus>, StoreError> {
        let since = Utc::now() - Duration::days(filters.days);

        let families = sqlx::query_as::<_, Family>(
            r#"
            SELECT * FROM family
            WHERE ordered_at > $1
              AND ($2::INTEGER IS NULL OR customer_id = $2)
            ORDER BY ordered_at DESC
            "#,
        )
        .bind(since)
        .bind(filters.customer_id)
        .fetch_all(&self.pool)
        .await?;

        let family_ids: Vec<i32> = families.iter().map(|f| f.id).collect();

        let samples = sqlx::query_as::<_, SampleProgress>(
            r#"
            SELECT fs.family_id, s.internal_id, a.is_external, s.downsampled_to,
                   s.received_at, s.prepared_at, s.sequenced_at, s.delivered_at, s.invoiced_at
            FROM family_sample fs
            JOIN sample s ON s.id = fs.sample_id
            JOIN application_version v ON v.id = s.application_version_id
            JOIN application a ON a.id = v.application_id
            WHERE fs.family_id = ANY($1)
            ORDER BY s.internal_id
            "#,
        )
        .bind(&family_ids)
        .fetch_all(&self.pool)
        .await?;

        let analyses = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT DISTINCT ON (family_id) * FROM analysis
            WHERE family_id = ANY($1)
            ORDER BY family_id, started_at DESC NULLS LAST, created_at DESC
            "#,
        )
        .bind(&family_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut samples_by_case: HashMap<i32, Vec<SampleProgress>> = HashMap::new();
        for sample in samples {
            samples_by_case.entry(sample.family_id).or_default().push(sample);
        }
        let latest_by_case: HashMap<i32, Analysis> =
            analyses.into_iter().map(|a| (a.family_id, a)).collect();

        Ok(families
            .iter()
            .map(|family| {
                let samples = samples_by_case.get(&family.id).map(Vec::as_slice).unwrap_or(&[]);
                CaseStatus::summarize(family, samples, latest_by_case.get(&family.id))
            })
            .filter(|status| filters.matches(status))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> Family {
        Family {
            id: 1,
            internal_id: "grumpyowl".to_string(),
            name: "family1".to_string(),
            customer_id: 7,
            data_analysis: "mip-dna".to_string(),
            data_delivery: "scout".to_string(),
            panels: vec!["OMIM-AUTO".to_string()],
            cohorts: Vec::new(),
            priority: 1,
            action: None,
            avatar_url: None,
            synopsis: None,
            ordered_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn sample(id: &str, external: bool) -> SampleProgress {
        SampleProgress {
            family_id: 1,
            internal_id: id.to_string(),
            is_external: external,
            downsampled_to: None,
            received_at: None,
            prepared_at: None,
            sequenced_at: None,
            delivered_at: None,
            invoiced_at: None,
        }
    }

    fn analysis(completed: bool, uploaded: bool) -> Analysis {
        let now = Utc::now();
        Analysis {
            id: 1,
            family_id: 1,
            pipeline: "mip-dna".to_string(),
            pipeline_version: Some("8.2.5".to_string()),
            started_at: Some(now),
            completed_at: completed.then_some(now),
            upload_started_at: None,
            uploaded_at: uploaded.then_some(now),
            delivered_at: None,
            delivery_report_created_at: None,
            is_primary: true,
            created_at: now,
        }
    }

    #[test]
    fn test_summarize_without_samples() {
        let status = CaseStatus::summarize(&family(), &[], None);
        assert_eq!(status.received_bool, None);
        assert_eq!(status.sequenced_bool, None);
        assert_eq!(status.analysed_bool, None);
        assert_eq!(status.uploaded_bool, None);
    }

    #[test]
    fn test_summarize_partial_reception() {
        let early = Utc::now() - Duration::days(2);
        let mut first = sample("ADM1", false);
        first.received_at = Some(early);
        let second = sample("ADM2", false);

        let status = CaseStatus::summarize(&family(), &[first.clone(), second], None);
        assert_eq!(status.received.total, 2);
        assert_eq!(status.received.done, 1);
        assert_eq!(status.received_bool, Some(false));
        assert_eq!(status.received.completed_at, None);

        let status = CaseStatus::summarize(&family(), &[first], None);
        assert_eq!(status.received_bool, Some(true));
        assert_eq!(status.received.completed_at, Some(early));
    }

    #[test]
    fn test_external_samples_skip_lab_stages() {
        let mut external = sample("ADM1", true);
        external.received_at = Some(Utc::now());

        let status = CaseStatus::summarize(&family(), &[external], None);
        assert_eq!(status.received_bool, Some(true));
        assert_eq!(status.prepared_bool, None);
        assert_eq!(status.sequenced_bool, None);
    }

    #[test]
    fn test_downsampled_samples_are_not_invoiced() {
        let mut downsampled = sample("ADM1", false);
        downsampled.downsampled_to = Some(100);

        let status = CaseStatus::summarize(&family(), &[downsampled], None);
        assert_eq!(status.invoiced.total, 0);
        assert_eq!(status.invoiced_bool, None);
    }

    #[test]
    fn test_analysis_flags() {
        let status = CaseStatus::summarize(&family(), &[], Some(&analysis(true, false)));
        assert_eq!(status.analysed_bool, Some(true));
        assert_eq!(status.uploaded_bool, Some(false));
        assert_eq!(status.analysis_pipeline.as_deref(), Some("mip-dna"));
    }

    #[test]
    fn test_filters_only_and_exclude() {
        let status = CaseStatus::summarize(&family(), &[], Some(&analysis(true, false)));

        let mut filters = CaseFilters::default();
        assert!(filters.matches(&status));

        filters.only.insert(Stage::Analysed);
        assert!(filters.matches(&status));

        filters.only.insert(Stage::Uploaded);
        assert!(!filters.matches(&status));

        let mut filters = CaseFilters::default();
        filters.exclude.insert(Stage::Analysed);
        assert!(!filters.matches(&status));
    }

    #[test]
    fn test_filters_on_case_fields() {
        let mut received = sample("ADM1", false);
        received.received_at = Some(Utc::now());
        let status = CaseStatus::summarize(&family(), &[received], None);

        let filters = CaseFilters {
            exclude_customer_id: Some(7),
            ..Default::default()
        };
        assert!(!filters.matches(&status));

        let filters = CaseFilters {
            sample_id: Some("ADM1".to_string()),
            data_analysis: Some(Pipeline::MipDna),
            ..Default::default()
        };
        assert!(filters.matches(&status));

        let filters = CaseFilters {
            action: Some(CaseAction::Hold),
            ..Default::default()
        };
        assert!(!filters.matches(&status));
    }
}

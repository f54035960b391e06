// ==============================================================================
// update.rs - Status Database Updates
// ==============================================================================
// Description: Case edits, upload markers and sequencing bookkeeping
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use tracing::info;

use super::{Store, StoreError};
use crate::constants::{CaseAction, DataDelivery, Pipeline, Priority};
use crate::models::{Analysis, Family, Flowcell, Sample};

/// Fields of a case that may be changed after the order
#[derive(Debug, Clone, Default)]
pub struct CaseUpdate {
    pub action: Option<CaseAction>,
    pub avatar_url: Option<String>,
    pub customer_id: Option<i32>,
    pub data_analysis: Option<Pipeline>,
    pub data_delivery: Option<DataDelivery>,
    pub panels: Option<Vec<String>>,
    pub priority: Option<Priority>,
}

impl CaseUpdate {
    pub fn is_empty(&self) -> bool {
        self.action.is_none()
            && self.avatar_url.is_none()
            && self.customer_id.is_none()
            && self.data_analysis.is_none()
            && self.data_delivery.is_none()
            && self.panels.is_none()
            && self.priority.is_none()
    }
}

impl Store {
    pub async fn update_case(&self, case_id: &str, update: &CaseUpdate) -> Result<Family, StoreError> {
        if update.is_empty() {
            return Err(StoreError::InvalidInput("nothing to update".to_string()));
        }

        let family = sqlx::query_as::<_, Family>(
            r#"
            UPDATE family SET
                action = COALESCE($2, action),
                avatar_url = COALESCE($3, avatar_url),
                customer_id = COALESCE($4, customer_id),
                data_analysis = COALESCE($5, data_analysis),
                data_delivery = COALESCE($6, data_delivery),
                panels = COALESCE($7, panels),
                priority = COALESCE($8, priority)
            WHERE internal_id = $1
            RETURNING *
            "#,
        )
        .bind(case_id)
        .bind(update.action.map(|a| a.as_str()))
        .bind(&update.avatar_url)
        .bind(update.customer_id)
        .bind(update.data_analysis.map(|p| p.as_str()))
        .bind(update.data_delivery.map(|d| d.as_str()))
        .bind(&update.panels)
        .bind(update.priority.map(|p| p.as_db()))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("case", case_id))?;

        info!("Updated case {}", case_id);
        Ok(family)
    }

    /// Set or clear the action of a case
    pub async fn set_case_action(&self, case_id: &str, action: Option<CaseAction>) -> Result<Family, StoreError> {
        let family = sqlx::query_as::<_, Family>(
            "UPDATE family SET action = $2 WHERE internal_id = $1 RETURNING *",
        )
        .bind(case_id)
        .bind(action.map(|a| a.as_str()))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("case", case_id))?;

        Ok(family)
    }

    /// Mark an upload as started unless one is already running or done.
    /// Returns `None` when another run holds the analysis. `restart` takes it
    /// over regardless.
    pub async fn claim_upload(&self, analysis_id: i32, restart: bool) -> Result<Option<Analysis>, StoreError> {
        let analysis = sqlx::query_as::<_, Analysis>(
            r#"
            UPDATE analysis SET upload_started_at = NOW()
            WHERE id = $1
              AND ($2 OR (upload_started_at IS NULL AND uploaded_at IS NULL))
            RETURNING *
            "#,
        )
        .bind(analysis_id)
        .bind(restart)
        .fetch_optional(&self.pool)
        .await?;
        Ok(analysis)
    }

    pub async fn mark_uploaded(&self, analysis_id: i32) -> Result<Analysis, StoreError> {
        self.set_analysis_timestamp(
            analysis_id,
            "UPDATE analysis SET uploaded_at = NOW() WHERE id = $1 RETURNING *",
        )
        .await
    }

    /// Forget a started upload so the next run picks it up again
    pub async fn reset_upload(&self, analysis_id: i32) -> Result<Analysis, StoreError> {
        self.set_analysis_timestamp(
            analysis_id,
            "UPDATE analysis SET upload_started_at = NULL WHERE id = $1 RETURNING *",
        )
        .await
    }

    pub async fn mark_delivery_report_created(&self, analysis_id: i32) -> Result<Analysis, StoreError> {
        self.set_analysis_timestamp(
            analysis_id,
            "UPDATE analysis SET delivery_report_created_at = NOW() WHERE id = $1 RETURNING *",
        )
        .await
    }

    async fn set_analysis_timestamp(&self, analysis_id: i32, statement: &str) -> Result<Analysis, StoreError> {
        sqlx::query_as::<_, Analysis>(statement)
            .bind(analysis_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("analysis", analysis_id))
    }

    /// Overwrite a sample's read count with the flowcell total
    pub async fn record_sample_reads(
        &self,
        sample_id: i32,
        reads: i64,
        sequenced_at: Option<DateTime<Utc>>,
    ) -> Result<Sample, StoreError> {
        let sample = sqlx::query_as::<_, Sample>(
            r#"
            UPDATE sample SET reads = $2, sequenced_at = COALESCE($3, sequenced_at)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(sample_id)
        .bind(reads)
        .bind(sequenced_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("sample", sample_id))?;

        Ok(sample)
    }

    pub async fn link_flowcell_sample(&self, flowcell_id: i32, sample_id: i32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO flowcell_sample (flowcell_id, sample_id) VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(flowcell_id)
        .bind(sample_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a flowcell or refresh the sequencer details of an existing one
    pub async fn upsert_flowcell(
        &self,
        name: &str,
        sequencer: &str,
        sequencer_type: &str,
        date: DateTime<Utc>,
    ) -> Result<Flowcell, StoreError> {
        let flowcell = sqlx::query_as::<_, Flowcell>(
            r#"
            INSERT INTO flowcell (name, sequencer_name, sequencer_type, sequenced_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET
                sequencer_name = EXCLUDED.sequencer_name,
                sequencer_type = EXCLUDED.sequencer_type,
                sequenced_at = EXCLUDED.sequenced_at
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(sequencer)
        .bind(sequencer_type)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(flowcell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_case_update() {
        assert!(CaseUpdate::default().is_empty());

        let update = CaseUpdate {
            action: Some(CaseAction::Hold),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}

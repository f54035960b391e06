// ==============================================================================
// models.rs - Status Database Models
// ==============================================================================
// Description: Row types for customers, samples, cases, analyses and friends
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-19
// Version: 3.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::constants::{CaseAction, Priority, Sex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CustomerGroup {
    pub id: i32,
    pub internal_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: i32,
    pub internal_id: String,
    pub name: String,
    pub customer_group_id: i32,
    pub scout_access: bool,
    pub invoice_address: String,
    pub invoice_reference: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: i32,
    pub tag: String,
    pub prep_category: String,
    pub description: String,
    pub is_accredited: bool,
    pub is_external: bool,
    pub is_archived: bool,
    pub percent_kth: i32,
    pub percent_reads_guaranteed: i32,
    pub target_reads: i64,
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// Reads a sample must reach before it counts as sequenced
    pub fn expected_reads(&self) -> i64 {
        self.target_reads * i64::from(self.percent_reads_guaranteed) / 100
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ApplicationVersion {
    pub id: i32,
    pub application_id: i32,
    pub version: i32,
    pub valid_from: DateTime<Utc>,
    pub price_standard: f64,
    pub price_priority: f64,
    pub price_express: f64,
    pub price_research: f64,
}

/// Prices for one application version, keyed the way orders name them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    pub standard: f64,
    pub priority: f64,
    pub express: f64,
    pub research: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Panel {
    pub id: i32,
    pub customer_id: i32,
    pub name: String,
    pub abbrev: String,
    pub current_version: f64,
    pub date: Option<DateTime<Utc>>,
    pub gene_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Organism {
    pub id: i32,
    pub internal_id: String,
    pub name: String,
    pub reference_genome: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Sample {
    pub id: i32,
    pub internal_id: String,
    pub name: String,
    pub customer_id: i32,
    pub application_version_id: i32,
    pub organism_id: Option<i32>,
    pub invoice_id: Option<i32>,
    pub sex: String,
    pub comment: Option<String>,
    pub control: Option<String>,
    pub downsampled_to: Option<i64>,
    pub is_tumour: bool,
    pub order: Option<String>,
    pub priority: i32,
    pub ticket_number: Option<i32>,
    pub reads: i64,
    pub ordered_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub sequenced_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub invoiced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Sample {
    pub fn sex(&self) -> Sex {
        self.sex.parse().unwrap_or(Sex::Unknown)
    }

    pub fn priority_human(&self) -> Priority {
        Priority::from_db(self.priority).unwrap_or_default()
    }
}

/// A case. The status database calls it a family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Family {
    pub id: i32,
    pub internal_id: String,
    pub name: String,
    pub customer_id: i32,
    pub data_analysis: String,
    pub data_delivery: String,
    pub panels: Vec<String>,
    pub cohorts: Vec<String>,
    pub priority: i32,
    pub action: Option<String>,
    pub avatar_url: Option<String>,
    pub synopsis: Option<String>,
    pub ordered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Family {
    pub fn priority_human(&self) -> Priority {
        Priority::from_db(self.priority).unwrap_or_default()
    }

    pub fn case_action(&self) -> Option<CaseAction> {
        self.action.as_deref().and_then(|a| a.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FamilySample {
    pub id: i32,
    pub family_id: i32,
    pub sample_id: i32,
    pub mother_id: Option<i32>,
    pub father_id: Option<i32>,
    pub status: String,
}

/// A case-sample link with both ends and the parents resolved
#[derive(Debug, Clone, Serialize)]
pub struct CaseLink {
    pub link: FamilySample,
    pub sample: Sample,
    pub mother: Option<Sample>,
    pub father: Option<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Flowcell {
    pub id: i32,
    pub name: String,
    pub sequencer_name: String,
    pub sequencer_type: String,
    pub sequenced_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Analysis {
    pub id: i32,
    pub family_id: i32,
    pub pipeline: String,
    pub pipeline_version: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub upload_started_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_report_created_at: Option<DateTime<Utc>>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Pool {
    pub id: i32,
    pub customer_id: i32,
    pub application_version_id: i32,
    pub invoice_id: Option<i32>,
    pub name: String,
    pub order: String,
    pub ticket_number: Option<i32>,
    pub comment: Option<String>,
    pub capture_kit: Option<String>,
    pub ordered_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub invoiced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Delivery {
    pub id: i32,
    pub destination: String,
    pub sample_id: Option<i32>,
    pub pool_id: Option<i32>,
    pub comment: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: i32,
    pub customer_id: i32,
    pub comment: Option<String>,
    pub discount: i32,
    pub record_type: Option<String>,
    pub invoiced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application(target_reads: i64, guaranteed: i32) -> Application {
        Application {
            id: 1,
            tag: "WGSPCFC030".to_string(),
            prep_category: "wgs".to_string(),
            description: "Whole genome".to_string(),
            is_accredited: true,
            is_external: false,
            is_archived: false,
            percent_kth: 80,
            percent_reads_guaranteed: guaranteed,
            target_reads,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expected_reads() {
        assert_eq!(application(1_000_000, 75).expected_reads(), 750_000);
        assert_eq!(application(0, 75).expected_reads(), 0);
    }
}

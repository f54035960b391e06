// ==============================================================================
// models.rs - API Data Models
// ==============================================================================
// Description: Request/response models for the status API
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

use cg_core::models::{CaseLink, Family};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_LIMIT: usize = 30;
pub const MAX_LIMIT: usize = 100;

/// Requested page size, capped at MAX_LIMIT
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

#[derive(Debug, Default, Deserialize)]
pub struct CasesQuery {
    /// Customer internal id
    pub customer: Option<String>,
    pub query: Option<String>,
    pub action: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SamplesQuery {
    pub customer: Option<String>,
    pub query: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationsQuery {
    pub category: Option<String>,
    pub archived: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub restart: bool,
    /// Mail the caller if the upload fails
    #[serde(default)]
    pub notify: bool,
}

#[derive(Debug, Serialize)]
pub struct CaseResponse {
    #[serde(flatten)]
    pub case: Family,
    pub links: Vec<CaseLink>,
}

/// Outcome of a dry-run order validation
#[derive(Debug, Serialize, PartialEq)]
pub struct ValidationResponse {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub request_id: Uuid,
    pub case_id: String,
    pub status: &'static str,
    pub progress_channel: String,
}

/// API information response
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: bool,
    pub redis: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

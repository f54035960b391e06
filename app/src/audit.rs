// ==============================================================================
// audit.rs - Audit Logging for Status Database Operations
// ==============================================================================
// Description: Audit trail for cases, orders, uploads and compression jobs
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Status database
    CaseCreated,
    CaseUpdated,
    SampleAdded,
    OrderSubmitted,

    // Upload workflow
    UploadStarted,
    UploadCompleted,
    UploadFailed,

    // Storage
    CompressionSubmitted,
    DecompressionSubmitted,
    FlowcellTransferred,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::CaseCreated => "case_created",
            AuditEventType::CaseUpdated => "case_updated",
            AuditEventType::SampleAdded => "sample_added",
            AuditEventType::OrderSubmitted => "order_submitted",
            AuditEventType::UploadStarted => "upload_started",
            AuditEventType::UploadCompleted => "upload_completed",
            AuditEventType::UploadFailed => "upload_failed",
            AuditEventType::CompressionSubmitted => "compression_submitted",
            AuditEventType::DecompressionSubmitted => "decompression_submitted",
            AuditEventType::FlowcellTransferred => "flowcell_transferred",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

impl LogSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSeverity::Info => "info",
            LogSeverity::Warning => "warning",
            LogSeverity::Error => "error",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub actor: Option<String>,
    pub resource: Option<String>,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        actor: Option<String>,
        resource: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        let severity = match event_type {
            AuditEventType::UploadFailed => LogSeverity::Error,
            AuditEventType::CaseUpdated => LogSeverity::Warning,
            _ => LogSeverity::Info,
        };

        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            actor,
            resource,
            details,
            severity,
        }
    }

    pub async fn log(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cg_audit (
                id, timestamp, event_type, actor, resource, details, severity
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(self.id)
        .bind(self.timestamp)
        .bind(self.event_type.as_str())
        .bind(&self.actor)
        .bind(&self.resource)
        .bind(&self.details)
        .bind(self.severity.as_str())
        .execute(pool)
        .await?;

        Ok(())
    }
}

/// Convenience function to log an audit event. Failures to write the
/// audit row are logged and swallowed so they never abort the operation.
pub async fn log_event(
    pool: &PgPool,
    event_type: AuditEventType,
    actor: &str,
    resource: Option<String>,
    details: serde_json::Value,
) {
    let event = AuditEvent::new(event_type, Some(actor.to_string()), resource, details);

    if let Err(e) = event.log(pool).await {
        tracing::warn!("Failed to write audit event {}: {}", event_type.as_str(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_creation() {
        let event = AuditEvent::new(
            AuditEventType::UploadCompleted,
            Some("cron".to_string()),
            Some("grumpyowl".to_string()),
            serde_json::json!({ "pipeline": "mip-dna" }),
        );

        assert_eq!(event.actor, Some("cron".to_string()));
        assert_eq!(event.resource, Some("grumpyowl".to_string()));
        assert_eq!(event.severity, LogSeverity::Info);
    }

    #[test]
    fn test_failure_event_severity() {
        let event = AuditEvent::new(
            AuditEventType::UploadFailed,
            None,
            None,
            serde_json::json!({}),
        );

        assert_eq!(event.severity, LogSeverity::Error);
    }

    #[test]
    fn test_event_type_matches_serde_name() {
        let json = serde_json::to_string(&AuditEventType::FlowcellTransferred).unwrap();
        assert_eq!(json, format!("\"{}\"", AuditEventType::FlowcellTransferred.as_str()));
    }
}

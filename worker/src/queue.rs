// ==============================================================================
// queue.rs - Redis Upload Queue (Worker Side)
// ==============================================================================
// Description: Consume manual upload requests and publish upload progress
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use cg_core::upload::UploadProgress;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const QUEUE_KEY: &str = "cg:upload_queue";
const PROGRESS_PREFIX: &str = "cg:upload:progress:";

/// Manual upload request (must match API gateway)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub request_id: Uuid,
    pub case_id: String,
    #[serde(default)]
    pub restart: bool,
    pub requested_by: String,
    /// Mailed when the upload fails
    pub notify_email: Option<String>,
}

pub fn progress_channel(case_id: &str) -> String {
    format!("{}{}", PROGRESS_PREFIX, case_id)
}

/// JSON message published for one workflow step
pub fn progress_message(request_id: Option<Uuid>, progress: &UploadProgress) -> String {
    serde_json::json!({
        "request_id": request_id,
        "case_id": progress.case_id,
        "step": progress.step,
        "progress_pct": progress.percent,
        "message": progress.message,
        "timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}

pub struct UploadQueue {
    conn: ConnectionManager,
}

impl UploadQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Dequeue a request (blocking pop with timeout)
    pub async fn dequeue(&mut self) -> Result<Option<UploadRequest>> {
        let result: Option<(String, String)> = self
            .conn
            .brpop(QUEUE_KEY, 1.0)
            .await
            .context("Failed to pop from upload queue")?;

        match result {
            Some((_, payload)) => {
                let request: UploadRequest =
                    serde_json::from_str(&payload).context("Failed to deserialize upload request")?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    pub async fn publish_progress(&mut self, request_id: Option<Uuid>, progress: &UploadProgress) -> Result<()> {
        let channel = progress_channel(&progress.case_id);
        self.conn
            .publish::<_, _, ()>(channel, progress_message(request_id, progress))
            .await
            .context("Failed to publish upload progress")?;

        Ok(())
    }
}

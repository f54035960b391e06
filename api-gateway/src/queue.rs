// ==============================================================================
// queue.rs - Redis Upload Queue (Gateway Side)
// ==============================================================================
// Description: Enqueue manual upload requests for the upload worker
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const QUEUE_KEY: &str = "cg:upload_queue";
const REQUEST_PREFIX: &str = "cg:upload:request:";
const PROGRESS_PREFIX: &str = "cg:upload:progress:";

/// Manual upload request (must match upload worker)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub request_id: Uuid,
    pub case_id: String,
    #[serde(default)]
    pub restart: bool,
    pub requested_by: String,
    pub notify_email: Option<String>,
}

impl UploadRequest {
    pub fn new(case_id: &str, restart: bool, requested_by: &str, notify_email: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            case_id: case_id.to_string(),
            restart,
            requested_by: requested_by.to_string(),
            notify_email,
        }
    }
}

pub struct UploadQueue {
    client: Client,
}

impl UploadQueue {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn request_key(request_id: Uuid) -> String {
        format!("{}{}", REQUEST_PREFIX, request_id)
    }

    pub fn progress_channel(case_id: &str) -> String {
        format!("{}{}", PROGRESS_PREFIX, case_id)
    }

    pub async fn enqueue(&self, request: &UploadRequest) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to get Redis connection")?;

        let payload = serde_json::to_string(request).context("Failed to serialize upload request")?;

        // LPUSH + worker BRPOP gives FIFO
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .context("Failed to push upload request")?;

        // Keep the request around for a day for lookups
        conn.set_ex::<_, _, ()>(Self::request_key(request.request_id), &payload, 86400)
            .await
            .context("Failed to store upload request")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_payload_shape() {
        let request = UploadRequest::new("grumpyowl", true, "admin@example.com", None);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["case_id"], "grumpyowl");
        assert_eq!(value["restart"], true);
        assert_eq!(value["requested_by"], "admin@example.com");
        assert!(value["notify_email"].is_null());
        assert!(value["request_id"].is_string());
    }

    #[test]
    fn test_keys() {
        let id = Uuid::nil();
        assert_eq!(
            UploadQueue::request_key(id),
            "cg:upload:request:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(UploadQueue::progress_channel("grumpyowl"), "cg:upload:progress:grumpyowl");
    }
}

// ==============================================================================
// main.rs - Upload Worker Process
// ==============================================================================
// Description: Uploads finished analyses on a schedule and on request from
//              the Redis upload queue
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use cg_core::config::CgConfig;
use cg_core::store::Store;
use cg_core::upload::{UploadApi, UploadProgress, UploadStep};
use chrono::{DateTime, Utc};
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::Client as RedisClient;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};

mod email;
mod queue;

use email::{EmailConfig, EmailSender, UploadFailure};
use queue::{UploadQueue, UploadRequest, QUEUE_KEY};

const SCHEDULED_ACTOR: &str = "cg-upload-worker";
const DEFAULT_INTERVAL_SECS: u64 = 3600;
const DEFAULT_STUCK_HOURS: i64 = 24;
const MAX_JITTER_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Starting upload worker v{}", env!("CARGO_PKG_VERSION"));

    let config = CgConfig::from_env().context("Invalid upload worker configuration")?;
    let store = Store::connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let redis_client = RedisClient::open(redis_url).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to create Redis connection manager")?;
    info!("Connected to Redis");

    let interval = schedule_interval(env_number("UPLOAD_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?)
        .context("Invalid UPLOAD_INTERVAL_SECS")?;
    let stuck_hours = env_number("UPLOAD_STUCK_HOURS", DEFAULT_STUCK_HOURS)?;

    let worker = Worker {
        store,
        config,
        redis_conn,
        interval,
        stuck_hours,
    };

    info!("Checking for uploads interrupted by a previous worker...");
    if let Err(e) = worker.recover_stuck_uploads().await {
        error!("Failed to recover stuck uploads: {:#}", e);
    }

    let scheduled = worker.clone();
    let schedule = tokio::spawn(async move {
        scheduled.schedule_loop().await;
    });

    info!("Worker ready, waiting on {}", QUEUE_KEY);
    run_until_stopped(worker.run(), schedule).await
}

/// Serve the queue until it fails or the scheduled task ends
async fn run_until_stopped(queue: impl Future<Output = Result<()>>, schedule: JoinHandle<()>) -> Result<()> {
    tokio::select! {
        result = queue => result,
        ended = schedule => match ended {
            Ok(()) => Err(anyhow::anyhow!("Scheduled upload task stopped")),
            Err(e) => Err(anyhow::anyhow!("Scheduled upload task failed: {}", e)),
        },
    }
}

/// Period of the scheduled upload run, at least one second
fn schedule_interval(secs: u64) -> Result<Duration> {
    if secs == 0 {
        anyhow::bail!("the upload interval must be at least one second");
    }
    Ok(Duration::from_secs(secs))
}

/// Parse a numeric environment variable, falling back to `default` when unset
fn env_number<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Uploads started before this instant are considered abandoned
fn stuck_cutoff(now: DateTime<Utc>, stuck_hours: i64) -> DateTime<Utc> {
    now - chrono::Duration::hours(stuck_hours)
}

/// Random delay before the first scheduled run, at most a tenth of the interval
fn schedule_jitter(interval: Duration) -> Duration {
    let max = (interval.as_secs() / 10).min(MAX_JITTER_SECS);
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs(rand::thread_rng().gen_range(0..=max))
}

/// Progress for requests that fail before the workflow reports anything
fn rejected_progress(case_id: &str, message: String) -> UploadProgress {
    UploadProgress {
        case_id: case_id.to_string(),
        step: UploadStep::Failed,
        percent: UploadStep::Failed.percent(),
        message,
    }
}

#[derive(Clone)]
struct Worker {
    store: Store,
    config: CgConfig,
    redis_conn: ConnectionManager,
    interval: Duration,
    stuck_hours: i64,
}

impl Worker {
    /// Manual queue loop
    async fn run(&self) -> Result<()> {
        let mut upload_queue = UploadQueue::new(self.redis_conn.clone());

        loop {
            match upload_queue.dequeue().await {
                Ok(Some(request)) => {
                    info!(
                        "Received upload request {} for {} from {}",
                        request.request_id, request.case_id, request.requested_by
                    );

                    let worker = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = worker.process_request(request).await {
                            error!("Upload request failed: {:#}", e);
                        }
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to dequeue upload request: {:#}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn process_request(&self, request: UploadRequest) -> Result<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<UploadProgress>();
        let mut progress_queue = UploadQueue::new(self.redis_conn.clone());
        let request_id = request.request_id;

        // Forward workflow steps to the case's progress channel
        let forwarder = tokio::spawn(async move {
            let mut finished = false;
            while let Some(progress) = receiver.recv().await {
                finished |= matches!(progress.step, UploadStep::Completed | UploadStep::Failed);
                if let Err(e) = progress_queue.publish_progress(Some(request_id), &progress).await {
                    warn!("Could not publish progress for {}: {:#}", progress.case_id, e);
                }
            }
            (progress_queue, finished)
        });

        let result = {
            let api = UploadApi::new(&self.store, &self.config).with_progress(sender);
            api.upload_case(&request.case_id, request.restart, &request.requested_by)
                .await
        };

        let (mut progress_queue, finished) = forwarder.await.context("Progress forwarder panicked")?;

        match result {
            Ok(()) => {
                info!("Upload request {} for {} complete", request_id, request.case_id);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if !finished {
                    let progress = rejected_progress(&request.case_id, message.clone());
                    progress_queue.publish_progress(Some(request_id), &progress).await?;
                }
                self.notify_failure(&request, message.clone()).await;
                Err(anyhow::anyhow!("Upload of {} failed: {}", request.case_id, message))
            }
        }
    }

    /// Mail the requester; mail problems never fail the request
    async fn notify_failure(&self, request: &UploadRequest, error: String) {
        let Some(to) = request.notify_email.clone() else {
            return;
        };

        let email_config = match EmailConfig::from_env() {
            Ok(Some(config)) => config,
            Ok(None) => {
                info!("SMTP not configured, skipping failure notice for {}", request.case_id);
                return;
            }
            Err(e) => {
                warn!("Failed to load email config: {:#}", e);
                return;
            }
        };

        let failure = UploadFailure {
            request_id: request.request_id.to_string(),
            case_id: request.case_id.clone(),
            requested_by: request.requested_by.clone(),
            error,
            failed_at: Utc::now(),
        };

        let sent = tokio::task::spawn_blocking(move || EmailSender::new(email_config).send_upload_failure(&to, &failure)).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to send failure notice for {}: {:#}", request.case_id, e),
            Err(e) => warn!("Email task failed: {}", e),
        }
    }

    /// Clear upload marks that were never completed
    async fn recover_stuck_uploads(&self) -> Result<()> {
        let cutoff = stuck_cutoff(Utc::now(), self.stuck_hours);
        let stuck = self
            .store
            .stuck_uploads(cutoff)
            .await
            .context("Failed to query stuck uploads")?;

        if stuck.is_empty() {
            info!("No stuck uploads found");
            return Ok(());
        }

        info!("Found {} stuck upload(s), resetting", stuck.len());
        for analysis in stuck {
            warn!(
                "Resetting upload of analysis {} started at {:?}",
                analysis.id, analysis.upload_started_at
            );
            self.store
                .reset_upload(analysis.id)
                .await
                .with_context(|| format!("Failed to reset analysis {}", analysis.id))?;
        }

        Ok(())
    }

    /// Scheduled uploads, every `interval`
    async fn schedule_loop(&self) {
        tokio::time::sleep(schedule_jitter(self.interval)).await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            info!("Running scheduled upload");

            if let Err(e) = self.recover_stuck_uploads().await {
                error!("Failed to recover stuck uploads: {:#}", e);
            }

            let api = UploadApi::new(&self.store, &self.config);
            match api.upload_pending(SCHEDULED_ACTOR).await {
                Ok(summary) if !summary.failed.is_empty() => {
                    warn!("Scheduled upload failed for: {}", summary.failed.join(", "));
                }
                Ok(_) => {}
                Err(e) => error!("Scheduled upload failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stuck_cutoff() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let cutoff = stuck_cutoff(now, 24);
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_schedule_jitter_bounds() {
        for _ in 0..50 {
            assert!(schedule_jitter(Duration::from_secs(3600)) <= Duration::from_secs(300));
            assert!(schedule_jitter(Duration::from_secs(600)) <= Duration::from_secs(60));
        }
        assert_eq!(schedule_jitter(Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_env_number_default_when_unset() {
        let value: u64 = env_number("CG_WORKER_TEST_UNSET_VARIABLE", 3600).unwrap();
        assert_eq!(value, 3600);
    }

    #[test]
    fn test_rejected_progress_is_terminal() {
        let progress = rejected_progress("grumpyowl", "Case not found: grumpyowl".to_string());
        assert_eq!(progress.step, UploadStep::Failed);
        assert_eq!(progress.percent, 100);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = schedule_interval(0).unwrap_err();
        assert!(err.to_string().contains("at least one second"));
        assert_eq!(schedule_interval(60).unwrap(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_stopped_schedule_ends_worker() {
        let schedule = tokio::spawn(async {
            panic!("schedule crashed");
        });
        let queue = std::future::pending::<Result<()>>();

        let err = run_until_stopped(queue, schedule).await.unwrap_err();
        assert!(err.to_string().contains("Scheduled upload task failed"));
    }
}

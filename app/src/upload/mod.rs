// ==============================================================================
// upload/mod.rs - Upload Workflow
// ==============================================================================
// Description: Ordered upload of finished analyses to the coverage and
//              variant portals, plus trending and GISAID exports
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod coverage;
#[cfg(test)]
mod fixtures;
pub mod gisaid;
pub mod variant_portal;
pub mod vogue;

pub use coverage::CoverageApi;
pub use gisaid::{GisaidApi, GisaidFiles};
pub use variant_portal::{ScoutLoadConfig, VariantPortalApi};
pub use vogue::{GenotypeApi, UploadVogueApi, VogueApi};

use std::future::Future;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::audit::{log_event, AuditEventType};
use crate::bundle::{case_analysis_dir, BundleError, MipAnalysis};
use crate::config::CgConfig;
use crate::constants::Pipeline;
use crate::models::{Analysis, CaseLink, Family};
use crate::process::ProcessError;
use crate::store::{Store, StoreError};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("External tool failed: {0}")]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No {tag} file found for sample {sample}")]
    MissingFile { sample: String, tag: String },

    #[error("Case not found: {0}")]
    CaseNotFound(String),

    #[error("Case {0} has no completed analysis")]
    NoCompletedAnalysis(String),

    #[error("Analysis of {0} is already uploaded, use restart to upload again")]
    AlreadyUploaded(String),

    #[error("Upload of {0} already started, use restart to override")]
    UploadInProgress(String),

    #[error("GISAID: {0}")]
    Gisaid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStep {
    Started,
    Coverage,
    VariantPortal,
    Completed,
    Failed,
}

impl UploadStep {
    pub fn percent(&self) -> u8 {
        match self {
            UploadStep::Started => 10,
            UploadStep::Coverage => 40,
            UploadStep::VariantPortal => 70,
            UploadStep::Completed | UploadStep::Failed => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadProgress {
    pub case_id: String,
    pub step: UploadStep,
    pub percent: u8,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadSummary {
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
}

/// Sends workflow steps to whoever started the upload
#[derive(Debug, Clone, Default)]
struct ProgressReporter {
    sender: Option<UnboundedSender<UploadProgress>>,
}

impl ProgressReporter {
    fn report(&self, case_id: &str, step: UploadStep, message: impl Into<String>) {
        if let Some(sender) = &self.sender {
            let progress = UploadProgress {
                case_id: case_id.to_string(),
                step,
                percent: step.percent(),
                message: message.into(),
            };
            if sender.send(progress).is_err() {
                warn!("Progress receiver for {} dropped", case_id);
            }
        }
    }
}

/// Upload markers and audit trail of an analysis
pub(crate) trait UploadLedger {
    async fn claim_upload(&self, analysis_id: i32, restart: bool) -> Result<Option<Analysis>, StoreError>;
    async fn analysis_by_id(&self, analysis_id: i32) -> Result<Option<Analysis>, StoreError>;
    async fn mark_uploaded(&self, analysis_id: i32) -> Result<Analysis, StoreError>;
    async fn reset_upload(&self, analysis_id: i32) -> Result<Analysis, StoreError>;
    async fn audit(&self, event_type: AuditEventType, actor: &str, case_id: &str, details: serde_json::Value);
}

impl UploadLedger for Store {
    async fn claim_upload(&self, analysis_id: i32, restart: bool) -> Result<Option<Analysis>, StoreError> {
        Store::claim_upload(self, analysis_id, restart).await
    }

    async fn analysis_by_id(&self, analysis_id: i32) -> Result<Option<Analysis>, StoreError> {
        Store::analysis_by_id(self, analysis_id).await
    }

    async fn mark_uploaded(&self, analysis_id: i32) -> Result<Analysis, StoreError> {
        Store::mark_uploaded(self, analysis_id).await
    }

    async fn reset_upload(&self, analysis_id: i32) -> Result<Analysis, StoreError> {
        Store::reset_upload(self, analysis_id).await
    }

    async fn audit(&self, event_type: AuditEventType, actor: &str, case_id: &str, details: serde_json::Value) {
        log_event(self.pool(), event_type, actor, Some(case_id.to_string()), details).await;
    }
}

/// Why an analysis in this state may not be uploaded without restart
fn refusal(analysis: &Analysis, case_id: &str) -> Option<UploadError> {
    if analysis.uploaded_at.is_some() {
        Some(UploadError::AlreadyUploaded(case_id.to_string()))
    } else if analysis.upload_started_at.is_some() {
        Some(UploadError::UploadInProgress(case_id.to_string()))
    } else {
        None
    }
}

/// Take the upload marker. The snapshot may be stale, the store decides.
async fn claim<L: UploadLedger>(
    ledger: &L,
    analysis: &Analysis,
    case_id: &str,
    restart: bool,
) -> Result<(), UploadError> {
    if !restart {
        if let Some(refused) = refusal(analysis, case_id) {
            return Err(refused);
        }
    }

    if ledger.claim_upload(analysis.id, restart).await?.is_some() {
        return Ok(());
    }

    let current = ledger
        .analysis_by_id(analysis.id)
        .await?
        .ok_or_else(|| StoreError::not_found("analysis", analysis.id))?;
    Err(refusal(&current, case_id).unwrap_or_else(|| UploadError::UploadInProgress(case_id.to_string())))
}

/// Record how a claimed upload ended
async fn settle<L: UploadLedger>(
    ledger: &L,
    progress: &ProgressReporter,
    analysis_id: i32,
    case_id: &str,
    actor: &str,
    outcome: Result<(), UploadError>,
) -> Result<(), UploadError> {
    let outcome = match outcome {
        Ok(()) => ledger.mark_uploaded(analysis_id).await.map(|_| ()).map_err(UploadError::from),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            ledger
                .audit(
                    AuditEventType::UploadCompleted,
                    actor,
                    case_id,
                    json!({ "analysis_id": analysis_id }),
                )
                .await;
            progress.report(case_id, UploadStep::Completed, "Upload complete");
            info!("Upload of {} complete", case_id);
            Ok(())
        }
        Err(e) => {
            error!("Upload of {} failed: {}", case_id, e);
            if let Err(reset) = ledger.reset_upload(analysis_id).await {
                error!("Could not reset upload of {}: {}", case_id, reset);
            }
            ledger
                .audit(
                    AuditEventType::UploadFailed,
                    actor,
                    case_id,
                    json!({ "analysis_id": analysis_id, "error": e.to_string() }),
                )
                .await;
            progress.report(case_id, UploadStep::Failed, e.to_string());
            Err(e)
        }
    }
}

/// Run `upload` for every item; one failure does not stop the rest
async fn upload_each<T, F, Fut>(items: Vec<T>, mut upload: F) -> UploadSummary
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = (String, Result<(), UploadError>)>,
{
    let mut summary = UploadSummary::default();

    for item in items {
        let (case_id, result) = upload(item).await;
        match result {
            Ok(()) => summary.uploaded.push(case_id),
            Err(e) => {
                warn!("Skipping {}: {}", case_id, e);
                summary.failed.push(case_id);
            }
        }
    }

    summary
}

/// Everything the portal steps need, loaded before any tool runs
struct UploadTarget {
    owner: String,
    links: Vec<CaseLink>,
    analysis: MipAnalysis,
}

pub struct UploadApi<'a> {
    store: &'a Store,
    analysis_root: PathBuf,
    coverage: CoverageApi,
    variant_portal: VariantPortalApi,
    progress: ProgressReporter,
}

impl<'a> UploadApi<'a> {
    pub fn new(store: &'a Store, config: &CgConfig) -> Self {
        Self {
            store,
            analysis_root: config.analysis_root.clone(),
            coverage: CoverageApi::new(&config.chanjo),
            variant_portal: VariantPortalApi::new(&config.scout),
            progress: ProgressReporter::default(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.coverage = self.coverage.with_dry_run(dry_run);
        self.variant_portal = self.variant_portal.with_dry_run(dry_run);
        self
    }

    /// Report each workflow step on `sender`
    pub fn with_progress(mut self, sender: UnboundedSender<UploadProgress>) -> Self {
        self.progress = ProgressReporter { sender: Some(sender) };
        self
    }

    async fn case(&self, case_id: &str) -> Result<Family, UploadError> {
        self.store
            .family(case_id)
            .await?
            .ok_or_else(|| UploadError::CaseNotFound(case_id.to_string()))
    }

    async fn completed_analysis(&self, case: &Family) -> Result<Analysis, UploadError> {
        self.store
            .latest_analysis(case.id)
            .await?
            .filter(|a| a.completed_at.is_some())
            .ok_or_else(|| UploadError::NoCompletedAnalysis(case.internal_id.clone()))
    }

    fn mip_analysis(&self, case: &Family) -> Result<MipAnalysis, UploadError> {
        Ok(MipAnalysis::load(&self.analysis_root, &case.internal_id)?)
    }

    async fn owner(&self, case: &Family) -> Result<String, UploadError> {
        let owner = self
            .store
            .customer_by_id(case.customer_id)
            .await?
            .ok_or_else(|| StoreError::not_found("customer", case.customer_id))?;
        Ok(owner.internal_id)
    }

    async fn target(&self, case: &Family) -> Result<UploadTarget, UploadError> {
        Ok(UploadTarget {
            owner: self.owner(case).await?,
            links: self.store.family_samples(&case.internal_id).await?,
            analysis: self.mip_analysis(case)?,
        })
    }

    pub async fn upload_coverage(&self, case_id: &str) -> Result<(), UploadError> {
        let case = self.case(case_id).await?;
        self.completed_analysis(&case).await?;
        let links = self.store.family_samples(&case.internal_id).await?;
        let analysis = self.mip_analysis(&case)?;
        self.coverage_for(&case, &links, &analysis).await
    }

    async fn coverage_for(&self, case: &Family, links: &[CaseLink], analysis: &MipAnalysis) -> Result<(), UploadError> {
        for link in links {
            let sample_id = link.sample.internal_id.as_str();
            let bed = analysis
                .bundle
                .first_with_tags(&["coverage", sample_id])
                .ok_or_else(|| UploadError::MissingFile {
                    sample: sample_id.to_string(),
                    tag: "coverage".to_string(),
                })?;

            if self.coverage.sample_exists(sample_id).await? {
                info!("Sample {} already in coverage portal, replacing", sample_id);
                self.coverage.delete_sample(sample_id).await?;
            }

            self.coverage
                .upload(sample_id, &link.sample.name, &case.internal_id, &case.name, &bed.path)
                .await?;
            info!("Uploaded coverage for {}", sample_id);
        }

        Ok(())
    }

    pub async fn upload_delivery(&self, case_id: &str) -> Result<PathBuf, UploadError> {
        let case = self.case(case_id).await?;
        self.completed_analysis(&case).await?;
        let target = self.target(&case).await?;
        self.delivery_for(&case, &target).await
    }

    async fn delivery_for(&self, case: &Family, target: &UploadTarget) -> Result<PathBuf, UploadError> {
        let config = self
            .variant_portal
            .build_load_config(case, &target.owner, &target.links, &target.analysis);

        let path = case_analysis_dir(&self.analysis_root, &case.internal_id).join(variant_portal::LOAD_CONFIG_NAME);
        std::fs::write(&path, serde_yaml::to_string(&config)?)?;
        info!("Wrote load config {}", path.display());

        self.variant_portal.load(&path).await?;
        Ok(path)
    }

    /// Upload the latest completed analysis of a case to both portals
    pub async fn upload_case(&self, case_id: &str, restart: bool, actor: &str) -> Result<(), UploadError> {
        let case = self.case(case_id).await?;
        let analysis = self.completed_analysis(&case).await?;
        self.upload_analysis(&case, &analysis, restart, actor).await
    }

    async fn upload_analysis(
        &self,
        case: &Family,
        analysis: &Analysis,
        restart: bool,
        actor: &str,
    ) -> Result<(), UploadError> {
        let case_id = case.internal_id.as_str();

        claim(self.store, analysis, case_id, restart).await?;
        log_event(
            self.store.pool(),
            AuditEventType::UploadStarted,
            actor,
            Some(case_id.to_string()),
            json!({ "analysis_id": analysis.id, "restart": restart }),
        )
        .await;
        self.progress
            .report(case_id, UploadStep::Started, format!("Uploading {}", case_id));

        let outcome = match self.target(case).await {
            Ok(target) => self.run_steps(case, &target).await,
            Err(e) => Err(e),
        };

        settle(self.store, &self.progress, analysis.id, case_id, actor, outcome).await
    }

    /// Coverage first, then the variant portal
    async fn run_steps(&self, case: &Family, target: &UploadTarget) -> Result<(), UploadError> {
        self.coverage_for(case, &target.links, &target.analysis).await?;
        self.progress
            .report(&case.internal_id, UploadStep::Coverage, "Coverage uploaded");

        self.delivery_for(case, target).await?;
        self.progress
            .report(&case.internal_id, UploadStep::VariantPortal, "Variant portal loaded");

        Ok(())
    }

    /// Upload every completed MIP DNA analysis nobody has picked up yet
    pub async fn upload_pending(&self, actor: &str) -> Result<UploadSummary, UploadError> {
        let mut pending = Vec::new();
        for analysis in self.store.analyses_to_upload(Some(Pipeline::MipDna)).await? {
            match self.store.family_by_id(analysis.family_id).await? {
                Some(case) => pending.push((case, analysis)),
                None => warn!("Analysis {} has no case, skipping", analysis.id),
            }
        }

        let summary = upload_each(pending, |(case, analysis)| async move {
            let result = self.upload_analysis(&case, &analysis, false, actor).await;
            (case.internal_id, result)
        })
        .await;

        info!(
            "Upload run finished: {} uploaded, {} failed",
            summary.uploaded.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use crate::upload::fixtures::{analysis_row, case, mip_analysis, trio};
    use chrono::Utc;
    use sqlx::postgres::PgPoolOptions;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc::unbounded_channel;

    /// In-memory upload markers; the claim is granted once unless restarted
    #[derive(Default)]
    struct MemoryLedger {
        held: AtomicBool,
        uploaded: bool,
        fail_mark_uploaded: bool,
        calls: Mutex<Vec<String>>,
    }

    impl MemoryLedger {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl UploadLedger for MemoryLedger {
        async fn claim_upload(&self, analysis_id: i32, restart: bool) -> Result<Option<Analysis>, StoreError> {
            self.record(format!("claim {} restart={}", analysis_id, restart));
            tokio::task::yield_now().await;
            let granted = !self.uploaded && !self.held.swap(true, Ordering::SeqCst);
            Ok((granted || restart).then(|| analysis_row(analysis_id)))
        }

        async fn analysis_by_id(&self, analysis_id: i32) -> Result<Option<Analysis>, StoreError> {
            let mut analysis = analysis_row(analysis_id);
            if self.held.load(Ordering::SeqCst) {
                analysis.upload_started_at = Some(Utc::now());
            }
            if self.uploaded {
                analysis.uploaded_at = Some(Utc::now());
            }
            Ok(Some(analysis))
        }

        async fn mark_uploaded(&self, analysis_id: i32) -> Result<Analysis, StoreError> {
            self.record(format!("mark_uploaded {}", analysis_id));
            if self.fail_mark_uploaded {
                return Err(StoreError::not_found("analysis", analysis_id));
            }
            Ok(analysis_row(analysis_id))
        }

        async fn reset_upload(&self, analysis_id: i32) -> Result<Analysis, StoreError> {
            self.record(format!("reset {}", analysis_id));
            self.held.store(false, Ordering::SeqCst);
            Ok(analysis_row(analysis_id))
        }

        async fn audit(&self, event_type: AuditEventType, _actor: &str, case_id: &str, _details: serde_json::Value) {
            self.record(format!("audit {} {}", event_type.as_str(), case_id));
        }
    }

    fn write_tool(dir: &Path, name: &str, script: &str) -> ToolConfig {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        ToolConfig {
            binary: path.display().to_string(),
            config: None,
        }
    }

    struct FakePortals {
        store: Store,
        chanjo: ToolConfig,
        scout: ToolConfig,
        log: PathBuf,
    }

    /// Fake chanjo and scout that append their argv to `tools.log`.
    /// ADM1 is already in the coverage portal.
    fn fake_portals(root: &TempDir, scout_exit: i32) -> FakePortals {
        let log = root.path().join("tools.log");
        let chanjo = write_tool(
            root.path(),
            "chanjo",
            &format!(
                "echo \"chanjo $*\" >> {log}\nif [ \"$2\" = samples ] && [ \"$4\" = ADM1 ]; then echo ADM1; fi",
                log = log.display()
            ),
        );
        let scout = write_tool(
            root.path(),
            "scout",
            &format!("echo \"scout $*\" >> {}\nexit {}", log.display(), scout_exit),
        );
        std::fs::create_dir_all(case_analysis_dir(root.path(), "grumpyowl")).unwrap();

        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://cg:cg@localhost/cg_test")
            .unwrap();
        FakePortals {
            store: Store::from_pool(pool),
            chanjo,
            scout,
            log,
        }
    }

    fn upload_api<'a>(
        portals: &'a FakePortals,
        root: &TempDir,
        sender: UnboundedSender<UploadProgress>,
    ) -> UploadApi<'a> {
        UploadApi {
            store: &portals.store,
            analysis_root: root.path().to_path_buf(),
            coverage: CoverageApi::new(&portals.chanjo),
            variant_portal: VariantPortalApi::new(&portals.scout),
            progress: ProgressReporter { sender: Some(sender) },
        }
    }

    fn target() -> UploadTarget {
        UploadTarget {
            owner: "cust000".to_string(),
            links: trio(),
            analysis: mip_analysis(),
        }
    }

    fn tool_calls(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn position(calls: &[String], prefix: &str) -> usize {
        calls
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with {prefix:?} in {calls:?}"))
    }

    #[tokio::test]
    async fn test_steps_replace_coverage_before_variant_portal() {
        let root = TempDir::new().unwrap();
        let portals = fake_portals(&root, 0);
        let (sender, mut receiver) = unbounded_channel();
        let api = upload_api(&portals, &root, sender);

        api.run_steps(&case(), &target()).await.unwrap();

        let calls = tool_calls(&portals.log);
        assert!(position(&calls, "chanjo db remove ADM1") < position(&calls, "chanjo load /a/ADM1.bed"));
        assert!(!calls.iter().any(|c| c.starts_with("chanjo db remove ADM2")));
        assert!(!calls.iter().any(|c| c.starts_with("chanjo db remove ADM3")));
        assert_eq!(calls.iter().filter(|c| c.starts_with("chanjo load")).count(), 3);

        let scout = position(&calls, "scout load config");
        assert_eq!(scout, calls.len() - 1);
        assert!(calls[scout].ends_with("grumpyowl/analysis/scout_load_config.yaml"));

        assert_eq!(receiver.recv().await.unwrap().step, UploadStep::Coverage);
        assert_eq!(receiver.recv().await.unwrap().step, UploadStep::VariantPortal);
    }

    #[tokio::test]
    async fn test_failing_variant_portal_stops_after_coverage() {
        let root = TempDir::new().unwrap();
        let portals = fake_portals(&root, 1);
        let (sender, mut receiver) = unbounded_channel();
        let api = upload_api(&portals, &root, sender);

        let err = api.run_steps(&case(), &target()).await.unwrap_err();
        assert!(matches!(err, UploadError::Process(ProcessError::Failed { code: Some(1), .. })));

        let calls = tool_calls(&portals.log);
        assert!(position(&calls, "chanjo load") < position(&calls, "scout load config"));
        assert_eq!(receiver.recv().await.unwrap().step, UploadStep::Coverage);
        drop(api);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_is_reset_and_audited() {
        let ledger = MemoryLedger::default();
        ledger.held.store(true, Ordering::SeqCst);
        let (sender, mut receiver) = unbounded_channel();
        let progress = ProgressReporter { sender: Some(sender) };

        let outcome = Err(UploadError::Process(ProcessError::Failed {
            code: Some(1),
            stderr: "scout: case exists".to_string(),
        }));
        let err = settle(&ledger, &progress, 7, "grumpyowl", "cron", outcome).await.unwrap_err();

        assert!(err.to_string().contains("scout: case exists"));
        assert_eq!(ledger.calls(), vec!["reset 7", "audit upload_failed grumpyowl"]);
        assert!(!ledger.held.load(Ordering::SeqCst));
        assert_eq!(receiver.recv().await.unwrap().step, UploadStep::Failed);
    }

    #[tokio::test]
    async fn test_mark_uploaded_failure_takes_failure_path() {
        let ledger = MemoryLedger {
            fail_mark_uploaded: true,
            ..Default::default()
        };
        let (sender, mut receiver) = unbounded_channel();
        let progress = ProgressReporter { sender: Some(sender) };

        let err = settle(&ledger, &progress, 7, "grumpyowl", "cron", Ok(())).await.unwrap_err();

        assert!(matches!(err, UploadError::Store(StoreError::NotFound { .. })));
        assert_eq!(
            ledger.calls(),
            vec!["mark_uploaded 7", "reset 7", "audit upload_failed grumpyowl"]
        );
        assert_eq!(receiver.recv().await.unwrap().step, UploadStep::Failed);
    }

    #[tokio::test]
    async fn test_successful_upload_is_marked_and_audited() {
        let ledger = MemoryLedger::default();
        let progress = ProgressReporter::default();

        settle(&ledger, &progress, 7, "grumpyowl", "cron", Ok(())).await.unwrap();
        assert_eq!(ledger.calls(), vec!["mark_uploaded 7", "audit upload_completed grumpyowl"]);
    }

    #[tokio::test]
    async fn test_refuses_uploaded_or_started_analysis() {
        let ledger = MemoryLedger::default();

        let mut uploaded = analysis_row(7);
        uploaded.uploaded_at = Some(Utc::now());
        let err = claim(&ledger, &uploaded, "grumpyowl", false).await.unwrap_err();
        assert!(matches!(err, UploadError::AlreadyUploaded(_)));

        let mut started = analysis_row(7);
        started.upload_started_at = Some(Utc::now());
        let err = claim(&ledger, &started, "grumpyowl", false).await.unwrap_err();
        assert!(matches!(err, UploadError::UploadInProgress(_)));

        assert!(ledger.calls().is_empty());

        claim(&ledger, &started, "grumpyowl", true).await.unwrap();
        assert_eq!(ledger.calls(), vec!["claim 7 restart=true"]);
    }

    #[tokio::test]
    async fn test_concurrent_claims_start_one_upload() {
        let ledger = MemoryLedger::default();
        let snapshot = analysis_row(7);

        let (first, second) = tokio::join!(
            claim(&ledger, &snapshot, "grumpyowl", false),
            claim(&ledger, &snapshot, "grumpyowl", false),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(UploadError::UploadInProgress(_)))));
    }

    #[tokio::test]
    async fn test_lost_claim_on_uploaded_analysis() {
        let ledger = MemoryLedger {
            uploaded: true,
            ..Default::default()
        };

        let err = claim(&ledger, &analysis_row(7), "grumpyowl", false).await.unwrap_err();
        assert!(matches!(err, UploadError::AlreadyUploaded(_)));
    }

    #[tokio::test]
    async fn test_pending_run_continues_after_failure() {
        let cases = vec!["grumpyowl", "sillybear", "happycat"];

        let summary = upload_each(cases, |case_id| async move {
            let result = if case_id == "sillybear" {
                Err(UploadError::NoCompletedAnalysis(case_id.to_string()))
            } else {
                Ok(())
            };
            (case_id.to_string(), result)
        })
        .await;

        assert_eq!(summary.uploaded, vec!["grumpyowl", "happycat"]);
        assert_eq!(summary.failed, vec!["sillybear"]);
    }

    #[test]
    fn test_step_percentages_increase() {
        let steps = [
            UploadStep::Started,
            UploadStep::Coverage,
            UploadStep::VariantPortal,
            UploadStep::Completed,
        ];
        assert!(steps.windows(2).all(|w| w[0].percent() < w[1].percent()));
        assert_eq!(UploadStep::Failed.percent(), 100);
    }

    #[test]
    fn test_progress_serializes_step_name() {
        let progress = UploadProgress {
            case_id: "grumpyowl".to_string(),
            step: UploadStep::VariantPortal,
            percent: UploadStep::VariantPortal.percent(),
            message: "Variant portal loaded".to_string(),
        };
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["step"], "variant_portal");
        assert_eq!(value["percent"], 70);
    }

    #[test]
    fn test_error_messages() {
        let err = UploadError::MissingFile {
            sample: "ADM1".to_string(),
            tag: "coverage".to_string(),
        };
        assert_eq!(err.to_string(), "No coverage file found for sample ADM1");
        assert!(UploadError::AlreadyUploaded("grumpyowl".to_string())
            .to_string()
            .contains("restart"));
    }
}

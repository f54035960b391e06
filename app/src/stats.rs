// ==============================================================================
// stats.rs - Sequencing Statistics Transfer
// ==============================================================================
// Description: Reads demultiplexing statistics and moves per-sample read
//              counts onto the status database
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::audit::{self, AuditEventType};
use crate::models::Flowcell;
use crate::store::{Store, StoreError};

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Statistics database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Flowcell not found in statistics database: {0}")]
    FlowcellNotFound(String),

    #[error("Flowcell {0} has no demultiplexing run")]
    NoDemux(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Sample name without lane suffix and A/B re-run markers
pub fn curated_sample_name(name: &str) -> &str {
    let raw = name.split_once('_').map_or(name, |(head, _)| head);
    raw.trim_end_matches(['A', 'B'])
}

/// Lowest q30 percentage accepted for a sequencer type
pub fn q30_threshold(sequencer_type: &str) -> Option<f64> {
    match sequencer_type {
        "hiseqga" => Some(80.0),
        "hiseqx" | "novaseq" => Some(75.0),
        _ => None,
    }
}

pub fn passes_q30(sequencer_type: &str, q30: f64) -> bool {
    q30_threshold(sequencer_type).is_some_and(|threshold| q30 >= threshold)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSample {
    pub name: String,
    pub reads: i64,
    pub fastqs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsFlowcell {
    pub name: String,
    pub sequencer: String,
    pub sequencer_type: String,
    pub date: DateTime<Utc>,
    pub samples: Vec<StatsSample>,
}

#[derive(Debug, FromRow)]
struct FlowcellRow {
    flowcell_id: i32,
    flowcellname: String,
    hiseqtype: String,
    time: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SampleRow {
    sample_id: i32,
    samplename: String,
}

/// Reads of one sample on one flowcell lane
#[derive(Debug, Clone, FromRow)]
pub struct LaneReads {
    pub name: String,
    #[sqlx(rename = "type")]
    pub sequencer_type: String,
    pub lane: i32,
    pub reads: i64,
    pub q30: f64,
}

/// Client for the demultiplexing statistics database
pub struct StatsApi {
    pool: PgPool,
    root: PathBuf,
}

impl StatsApi {
    pub async fn connect(database_url: &str, root: impl Into<PathBuf>) -> Result<Self, StatsError> {
        info!("Connecting to statistics database");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool,
            root: root.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn flowcell(&self, name: &str) -> Result<StatsFlowcell, StatsError> {
        let flowcell = sqlx::query_as::<_, FlowcellRow>(
            "SELECT flowcell_id, flowcellname, hiseqtype, time FROM flowcell WHERE flowcellname = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StatsError::FlowcellNotFound(name.to_string()))?;

        let sequencer: String = sqlx::query_scalar(
            r#"
            SELECT ds.machine FROM demux d
            JOIN datasource ds ON ds.datasource_id = d.datasource_id
            WHERE d.flowcell_id = $1
            ORDER BY d.demux_id
            LIMIT 1
            "#,
        )
        .bind(flowcell.flowcell_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StatsError::NoDemux(name.to_string()))?;

        let samples = self.flowcell_samples(&flowcell).await?;

        Ok(StatsFlowcell {
            name: flowcell.flowcellname,
            sequencer,
            sequencer_type: flowcell.hiseqtype,
            date: flowcell.time,
            samples,
        })
    }

    async fn flowcell_samples(&self, flowcell: &FlowcellRow) -> Result<Vec<StatsSample>, StatsError> {
        let samples = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT DISTINCT s.sample_id, s.samplename FROM sample s
            JOIN unaligned u ON u.sample_id = s.sample_id
            JOIN demux d ON d.demux_id = u.demux_id
            WHERE d.flowcell_id = $1
            ORDER BY s.samplename
            "#,
        )
        .bind(flowcell.flowcell_id)
        .fetch_all(&self.pool)
        .await?;

        let pooled = self.pooled_lanes(flowcell.flowcell_id).await?;

        let mut out = Vec::with_capacity(samples.len());
        for sample in samples {
            let curated = curated_sample_name(&sample.samplename).to_string();
            let mut reads = 0;
            let mut fastqs = Vec::new();

            for lane in self.sample_reads(sample.sample_id).await? {
                if !passes_q30(&lane.sequencer_type, lane.q30) {
                    warn!(
                        "q30 too low for {} on {}:{} < {}%",
                        curated,
                        lane.name,
                        lane.q30,
                        q30_threshold(&lane.sequencer_type).unwrap_or(75.0)
                    );
                    continue;
                }
                reads += lane.reads;

                let lane_pooled = pooled.get(&lane.lane).copied().unwrap_or(false);
                fastqs.extend(
                    find_fastqs(&self.root, &lane.name, &sample.samplename)
                        .into_iter()
                        .filter(|path| !(lane_pooled && path.to_string_lossy().contains("Undetermined"))),
                );
            }

            out.push(StatsSample {
                name: curated,
                reads,
                fastqs,
            });
        }
        Ok(out)
    }

    /// Lane number to whether more than one sample ran on it
    async fn pooled_lanes(&self, flowcell_id: i32) -> Result<BTreeMap<i32, bool>, StatsError> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT u.lane, COUNT(u.sample_id) FROM unaligned u
            JOIN demux d ON d.demux_id = u.demux_id
            WHERE d.flowcell_id = $1
            GROUP BY u.lane
            "#,
        )
        .bind(flowcell_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(lane, count)| (lane, count > 1)).collect())
    }

    async fn sample_reads(&self, sample_id: i32) -> Result<Vec<LaneReads>, StatsError> {
        let reads = sqlx::query_as::<_, LaneReads>(
            r#"
            SELECT f.flowcellname AS name, f.hiseqtype AS type, u.lane,
                   SUM(u.readcounts)::BIGINT AS reads,
                   MIN(u.q30_bases_pct)::DOUBLE PRECISION AS q30
            FROM unaligned u
            JOIN demux d ON d.demux_id = u.demux_id
            JOIN flowcell f ON f.flowcell_id = d.flowcell_id
            WHERE u.sample_id = $1
            GROUP BY f.flowcellname, f.hiseqtype, u.lane
            "#,
        )
        .bind(sample_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reads)
    }

    /// Latest demultiplexing run name of a flowcell
    pub async fn run_name(&self, flowcell: &str) -> Result<Option<String>, StatsError> {
        let run_name = sqlx::query_scalar(
            r#"
            SELECT ds.runname FROM flowcell f
            JOIN demux d ON d.flowcell_id = f.flowcell_id
            JOIN datasource ds ON ds.datasource_id = d.datasource_id
            WHERE f.flowcellname = $1
            ORDER BY ds.time DESC
            LIMIT 1
            "#,
        )
        .bind(flowcell)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run_name)
    }
}

/// FASTQ files of a sample on a flowcell, laid out as
/// `*<flowcell>/Unaligned*/Project_*/Sample_<name>[_*]/*.fastq.gz`
pub fn find_fastqs(root: &Path, flowcell: &str, sample_name: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(5)
        .max_depth(5)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .map(|relative| is_sample_fastq(relative, flowcell, sample_name))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

fn is_sample_fastq(relative: &Path, flowcell: &str, sample_name: &str) -> bool {
    let parts: Vec<&str> = relative.iter().filter_map(|p| p.to_str()).collect();
    let [run_dir, unaligned, project, sample_dir, file] = parts.as_slice() else {
        return false;
    };

    let sample_matches = sample_dir
        .strip_prefix("Sample_")
        .and_then(|rest| rest.strip_prefix(sample_name))
        .is_some_and(|suffix| suffix.is_empty() || suffix.starts_with('_'));

    run_dir.ends_with(flowcell)
        && unaligned.starts_with("Unaligned")
        && project.starts_with("Project_")
        && sample_matches
        && file.ends_with(".fastq.gz")
}

/// Copy read counts and sequencing dates of a flowcell into the status
/// database. Samples the status database does not know are skipped.
pub async fn transfer_flowcell(store: &Store, stats: &StatsApi, name: &str) -> Result<Flowcell, StatsError> {
    let stats_flowcell = stats.flowcell(name).await?;

    let flowcell = store
        .upsert_flowcell(
            &stats_flowcell.name,
            &stats_flowcell.sequencer,
            &stats_flowcell.sequencer_type,
            stats_flowcell.date,
        )
        .await?;

    let mut transferred = 0usize;
    for stats_sample in &stats_flowcell.samples {
        let Some(sample) = store.sample(&stats_sample.name).await? else {
            warn!("Unable to find {} in status database - skipping", stats_sample.name);
            continue;
        };

        store
            .record_sample_reads(sample.id, stats_sample.reads, Some(stats_flowcell.date))
            .await?;
        store.link_flowcell_sample(flowcell.id, sample.id).await?;
        info!("{}: {} reads on {}", sample.internal_id, stats_sample.reads, flowcell.name);
        transferred += 1;
    }

    audit::log_event(
        store.pool(),
        AuditEventType::FlowcellTransferred,
        "cg",
        Some(flowcell.name.clone()),
        serde_json::json!({
            "samples": transferred,
            "sequencer": flowcell.sequencer_name,
        }),
    )
    .await;

    Ok(flowcell)
}

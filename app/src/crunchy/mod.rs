// ==============================================================================
// mod.rs - FASTQ/SPRING Compression
// ==============================================================================
// Description: Compression state checks and crunchy job submission
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
//
// Compression state of a run is read from the filesystem:
//   <run>_R1_001.fastq.gz / <run>_R2_001.fastq.gz   FASTQ pair
//   <run>.spring                                     SPRING archive
//   <run>.json                                       crunchy metadata
//   <run>.crunchy.pending.txt                        job in flight
//
// ==============================================================================

pub mod files;
pub mod sbatch;

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::CgConfig;
use crate::constants::FASTQ_DELTA_DAYS;
use crate::slurm::{Sbatch, SlurmApi, SlurmError};

use files::CrunchyFileKind;
use sbatch::{CompressCommand, DecompressCommand};

pub const FASTQ_FIRST_READ_SUFFIX: &str = "_R1_001.fastq.gz";
pub const FASTQ_SECOND_READ_SUFFIX: &str = "_R2_001.fastq.gz";
pub const SPRING_SUFFIX: &str = ".spring";
pub const PENDING_PATH_SUFFIX: &str = ".crunchy.pending.txt";

#[derive(Error, Debug)]
pub enum CrunchyError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed SPRING metadata in {path}: {reason}")]
    MalformedMetadata { path: PathBuf, reason: String },

    #[error("SPRING metadata {path} lists {count} files, expected 3")]
    WrongFileCount { path: PathBuf, count: usize },

    #[error("SPRING metadata has no {0:?} entry")]
    MissingArchiveFile(CrunchyFileKind),

    #[error("Not a first read FASTQ: {0}")]
    NotFirstRead(PathBuf),

    #[error("Pending flag already exists: {0}")]
    AlreadyPending(PathBuf),

    #[error(transparent)]
    Slurm(#[from] SlurmError),
}

/// Paths belonging to one sequencing run of a sample
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionData {
    pub run_name: String,
    pub analysis_dir: PathBuf,
    pub fastq_first: PathBuf,
    pub fastq_second: PathBuf,
    pub spring_path: PathBuf,
    pub spring_metadata_path: PathBuf,
    pub pending_path: PathBuf,
}

impl CompressionData {
    /// Derive every path from the first read of the pair
    pub fn from_fastq_first(fastq_first: &Path) -> Result<Self, CrunchyError> {
        let file_name = fastq_first
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CrunchyError::NotFirstRead(fastq_first.to_path_buf()))?;

        let run_name = file_name
            .strip_suffix(FASTQ_FIRST_READ_SUFFIX)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| CrunchyError::NotFirstRead(fastq_first.to_path_buf()))?;

        let analysis_dir = fastq_first
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self::from_run(&analysis_dir, run_name))
    }

    /// Derive every path from the SPRING archive
    pub fn from_spring(spring_path: &Path) -> Option<Self> {
        let file_name = spring_path.file_name()?.to_str()?;
        let run_name = file_name.strip_suffix(SPRING_SUFFIX)?;
        let analysis_dir = spring_path.parent()?.to_path_buf();
        Some(Self::from_run(&analysis_dir, run_name))
    }

    fn from_run(analysis_dir: &Path, run_name: &str) -> Self {
        Self {
            run_name: run_name.to_string(),
            analysis_dir: analysis_dir.to_path_buf(),
            fastq_first: analysis_dir.join(format!("{}{}", run_name, FASTQ_FIRST_READ_SUFFIX)),
            fastq_second: analysis_dir.join(format!("{}{}", run_name, FASTQ_SECOND_READ_SUFFIX)),
            spring_path: analysis_dir.join(format!("{}{}", run_name, SPRING_SUFFIX)),
            spring_metadata_path: analysis_dir.join(format!("{}.json", run_name)),
            pending_path: analysis_dir.join(format!("{}{}", run_name, PENDING_PATH_SUFFIX)),
        }
    }

    pub fn pair_exists(&self) -> bool {
        self.fastq_first.exists() && self.fastq_second.exists()
    }

    pub fn spring_exists(&self) -> bool {
        self.spring_path.exists()
    }

    pub fn metadata_exists(&self) -> bool {
        self.spring_metadata_path.exists()
    }

    pub fn pending_exists(&self) -> bool {
        self.pending_path.exists()
    }
}

/// True once `FASTQ_DELTA_DAYS` have passed since the archive was unpacked
pub fn check_if_update_spring(updated: NaiveDate, today: NaiveDate) -> bool {
    let delta = updated + Duration::days(FASTQ_DELTA_DAYS);
    if delta > today {
        info!("FASTQ files are not old enough");
        return false;
    }
    true
}

pub struct CrunchyApi {
    slurm_account: String,
    conda_env: String,
    mail_user: String,
    fastq_root: PathBuf,
    ntasks: u32,
    memory: u32,
    slurm: SlurmApi,
    dry_run: bool,
}

impl CrunchyApi {
    pub fn new(config: &CgConfig, dry_run: bool) -> Self {
        Self {
            slurm_account: config.slurm.account.clone(),
            conda_env: config.crunchy.conda_env.clone(),
            mail_user: config.slurm.mail_user.clone(),
            fastq_root: config.fastq_root.clone(),
            ntasks: 12,
            memory: 50,
            slurm: SlurmApi::new(dry_run),
            dry_run,
        }
    }

    pub fn with_resources(mut self, ntasks: u32, memory: u32) -> Self {
        self.ntasks = ntasks;
        self.memory = memory;
        self
    }

    pub fn is_compression_pending(data: &CompressionData) -> bool {
        if data.pending_exists() {
            info!("Compression/decompression is pending for {}", data.run_name);
            return true;
        }
        false
    }

    pub fn is_fastq_compression_possible(data: &CompressionData) -> bool {
        if Self::is_compression_pending(data) {
            return false;
        }
        if data.spring_exists() {
            info!("SPRING file found for {}", data.run_name);
            return false;
        }
        info!("FASTQ compression is possible for {}", data.run_name);
        true
    }

    pub fn is_spring_decompression_possible(data: &CompressionData) -> bool {
        if Self::is_compression_pending(data) {
            return false;
        }
        if !data.spring_exists() {
            info!("No SPRING file found for {}", data.run_name);
            return false;
        }
        if data.pair_exists() {
            info!("FASTQ files already exist for {}", data.run_name);
            return false;
        }
        info!("Decompression is possible for {}", data.run_name);
        true
    }

    /// Malformed metadata is an error, not a "no"
    pub fn is_fastq_compression_done(data: &CompressionData) -> Result<bool, CrunchyError> {
        Self::is_fastq_compression_done_on(data, Utc::now().date_naive())
    }

    fn is_fastq_compression_done_on(data: &CompressionData, today: NaiveDate) -> Result<bool, CrunchyError> {
        if !data.spring_exists() {
            info!("No SPRING file for {}", data.run_name);
            return Ok(false);
        }
        if !data.metadata_exists() {
            info!("No SPRING metadata file for {}", data.run_name);
            return Ok(false);
        }

        let metadata = files::get_crunchy_metadata(&data.spring_metadata_path)?;

        match files::get_file_updated_at(&metadata) {
            None => {
                info!("FASTQ compression is done for {}", data.run_name);
                Ok(true)
            }
            Some(updated) => {
                info!("Files were unpacked {}", updated);
                Ok(check_if_update_spring(updated, today))
            }
        }
    }

    pub fn is_spring_decompression_done(data: &CompressionData) -> Result<bool, CrunchyError> {
        if !data.metadata_exists() {
            info!("No SPRING metadata file found for {}", data.run_name);
            return Ok(false);
        }

        let metadata = files::get_crunchy_metadata(&data.spring_metadata_path)?;

        for file in &metadata.files {
            if !file.path.exists() {
                info!("File {} does not exist", file.path.display());
                return Ok(false);
            }
            if file.updated.is_none() {
                info!("Files have not been unarchived");
                return Ok(false);
            }
        }

        info!("SPRING decompression is done for run {}", data.run_name);
        Ok(true)
    }

    fn create_pending_file(&self, pending_path: &Path) -> Result<(), CrunchyError> {
        info!("Creating pending flag {}", pending_path.display());
        if self.dry_run {
            return Ok(());
        }
        if pending_path.exists() {
            return Err(CrunchyError::AlreadyPending(pending_path.to_path_buf()));
        }
        std::fs::write(pending_path, b"").map_err(|source| CrunchyError::Io {
            path: pending_path.to_path_buf(),
            source,
        })
    }

    fn sbatch(&self, job_name: String, log_dir: PathBuf, commands: String, error: String) -> Sbatch {
        let mut job = Sbatch::new(job_name, &self.slurm_account, log_dir);
        job.email = self.mail_user.clone();
        job.number_tasks = self.ntasks;
        job.memory = self.memory;
        job.hours = 24;
        job.commands = commands;
        job.error = Some(error);
        job
    }

    /// Submit a FASTQ to SPRING job. Returns the SLURM job number.
    pub async fn fastq_to_spring(&self, data: &CompressionData, sample_id: &str) -> Result<u64, CrunchyError> {
        self.create_pending_file(&data.pending_path)?;

        let log_dir = files::get_log_dir(&data.spring_path);
        let tmp_dir = files::get_tmp_dir("spring_", "_compress", &data.analysis_dir);

        let commands = sbatch::fastq_to_spring_commands(&CompressCommand {
            conda_env: &self.conda_env,
            tmp_dir: &tmp_dir,
            fastq_first: &data.fastq_first,
            fastq_second: &data.fastq_second,
            spring_path: &data.spring_path,
            pending_path: &data.pending_path,
            ntasks: self.ntasks,
        });
        let error = sbatch::fastq_to_spring_error(&data.spring_path, &data.pending_path);

        let job = self.sbatch(
            format!("{}_{}_fastq_to_spring", sample_id, data.run_name),
            log_dir.clone(),
            commands,
            error,
        );
        let content = SlurmApi::generate_sbatch_content(&job);
        let sbatch_path = files::get_fastq_to_spring_sbatch_path(&log_dir, &data.run_name);

        let number = self.slurm.submit_sbatch(&content, &sbatch_path).await?;
        info!("FASTQ compression running as job {}", number);
        Ok(number)
    }

    /// Submit a SPRING to FASTQ job. Returns the SLURM job number.
    pub async fn spring_to_fastq(&self, data: &CompressionData, sample_id: &str) -> Result<u64, CrunchyError> {
        let metadata = files::get_crunchy_metadata(&data.spring_metadata_path)?;
        let archive = files::get_spring_archive_files(&metadata)?;

        self.create_pending_file(&data.pending_path)?;

        let log_dir = files::get_log_dir(&data.spring_path);
        let tmp_dir = files::get_tmp_dir("spring_", "_decompress", &data.analysis_dir);

        let commands = sbatch::spring_to_fastq_commands(&DecompressCommand {
            conda_env: &self.conda_env,
            tmp_dir: &tmp_dir,
            fastq_first: &data.fastq_first,
            fastq_second: &data.fastq_second,
            spring_path: &data.spring_path,
            pending_path: &data.pending_path,
            checksum_first: archive.fastq_first.checksum.as_deref().unwrap_or_default(),
            checksum_second: archive.fastq_second.checksum.as_deref().unwrap_or_default(),
            ntasks: self.ntasks,
        });
        let error = sbatch::spring_to_fastq_error(&data.fastq_first, &data.fastq_second, &data.pending_path);

        let job = self.sbatch(
            format!("{}_{}_spring_to_fastq", sample_id, data.run_name),
            log_dir.clone(),
            commands,
            error,
        );
        let content = SlurmApi::generate_sbatch_content(&job);
        let sbatch_path = files::get_spring_to_fastq_sbatch_path(&log_dir, &data.run_name);

        let number = self.slurm.submit_sbatch(&content, &sbatch_path).await?;
        info!("SPRING decompression running as job {}", number);
        Ok(number)
    }

    pub fn sample_dir(&self, sample_id: &str) -> PathBuf {
        self.fastq_root.join(sample_id)
    }

    /// Compress every FASTQ pair of a sample that can be compressed.
    /// Returns false when nothing was submitted.
    pub async fn compress_fastq(&self, sample_id: &str) -> Result<bool, CrunchyError> {
        let runs = find_fastq_runs(&self.sample_dir(sample_id));
        if runs.is_empty() {
            warn!("Could not find any FASTQ files for {}", sample_id);
            return Ok(false);
        }

        let mut submitted = false;
        for data in runs {
            if !data.pair_exists() {
                warn!("Second read missing for {}", data.run_name);
                continue;
            }
            if !Self::is_fastq_compression_possible(&data) {
                continue;
            }
            self.fastq_to_spring(&data, sample_id).await?;
            submitted = true;
        }

        Ok(submitted)
    }

    /// Unpack every SPRING archive of a sample that can be unpacked
    pub async fn decompress_spring(&self, sample_id: &str) -> Result<bool, CrunchyError> {
        let archives = find_spring_archives(&self.sample_dir(sample_id));
        if archives.is_empty() {
            warn!("Could not find any SPRING archives for {}", sample_id);
            return Ok(false);
        }

        let mut submitted = false;
        for data in archives {
            if !Self::is_spring_decompression_possible(&data) {
                continue;
            }
            self.spring_to_fastq(&data, sample_id).await?;
            if !self.dry_run {
                files::update_metadata_date(&data.spring_metadata_path)?;
            }
            submitted = true;
        }

        Ok(submitted)
    }

    /// Remove FASTQ pairs whose compression is done
    pub fn clean_fastq(&self, sample_id: &str) -> Result<bool, CrunchyError> {
        let runs = find_fastq_runs(&self.sample_dir(sample_id));

        let mut cleaned = false;
        for data in runs {
            if !Self::is_fastq_compression_done(&data)? {
                info!("FASTQ compression not done for {}", data.run_name);
                continue;
            }

            for path in [&data.fastq_first, &data.fastq_second] {
                info!("Removing {}", path.display());
                if self.dry_run || !path.exists() {
                    continue;
                }
                std::fs::remove_file(path).map_err(|source| CrunchyError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            cleaned = true;
        }

        Ok(cleaned)
    }
}

/// Every `<run>_R1_001.fastq.gz` below `dir`, sorted by path
pub fn find_fastq_runs(dir: &Path) -> Vec<CompressionData> {
    let mut runs: Vec<CompressionData> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| CompressionData::from_fastq_first(e.path()).ok())
        .collect();
    runs.sort_by(|a, b| a.fastq_first.cmp(&b.fastq_first));
    runs
}

/// Every `<run>.spring` below `dir`, sorted by path
pub fn find_spring_archives(dir: &Path) -> Vec<CompressionData> {
    let mut archives: Vec<CompressionData> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| CompressionData::from_spring(e.path()))
        .collect();
    archives.sort_by(|a, b| a.spring_path.cmp(&b.spring_path));
    archives
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    fn metadata(updated: Option<&str>, dir: &Path) -> String {
        let updated = updated.map(|d| format!(r#", "updated": "{}""#, d)).unwrap_or_default();
        format!(
            r#"[{{"path": "{d}/run_R1_001.fastq.gz", "file": "first_read", "checksum": "a"{u}}},
               {{"path": "{d}/run_R2_001.fastq.gz", "file": "second_read", "checksum": "b"{u}}},
               {{"path": "{d}/run.spring", "file": "spring"{u}}}]"#,
            d = dir.display(),
            u = updated
        )
    }

    fn config(root: &Path) -> CgConfig {
        CgConfig {
            database_url: String::new(),
            analysis_root: root.to_path_buf(),
            fastq_root: root.to_path_buf(),
            chanjo: crate::config::ToolConfig { binary: "chanjo".into(), config: None },
            scout: crate::config::ToolConfig { binary: "scout".into(), config: None },
            vogue_binary: "vogue".into(),
            genotype_binary: "genotype".into(),
            crunchy: crate::config::CrunchyConfig {
                conda_env: "S_crunchy".into(),
                cram_reference: PathBuf::from("/ref.fa"),
            },
            slurm: crate::config::SlurmConfig {
                account: "production".into(),
                mail_user: "ops@example.com".into(),
                qos: Default::default(),
            },
            mutant_root: root.to_path_buf(),
            gisaid_submitter: "submitter".into(),
            cgstats_database_url: None,
            cgstats_root: root.to_path_buf(),
        }
    }

    #[test]
    fn test_compression_data_paths() {
        let data = CompressionData::from_fastq_first(Path::new("/fq/ACC1/HVX_L001_R1_001.fastq.gz")).unwrap();
        assert_eq!(data.run_name, "HVX_L001");
        assert_eq!(data.fastq_second, PathBuf::from("/fq/ACC1/HVX_L001_R2_001.fastq.gz"));
        assert_eq!(data.spring_path, PathBuf::from("/fq/ACC1/HVX_L001.spring"));
        assert_eq!(data.spring_metadata_path, PathBuf::from("/fq/ACC1/HVX_L001.json"));
        assert_eq!(data.pending_path, PathBuf::from("/fq/ACC1/HVX_L001.crunchy.pending.txt"));

        assert!(CompressionData::from_fastq_first(Path::new("/fq/ACC1/HVX_L001_R2_001.fastq.gz")).is_err());
        assert_eq!(CompressionData::from_spring(&data.spring_path), Some(data.clone()));
    }

    #[test]
    fn test_compression_possible_states() {
        let dir = TempDir::new().unwrap();
        let data = CompressionData::from_fastq_first(&dir.path().join("run_R1_001.fastq.gz")).unwrap();

        assert!(CrunchyApi::is_fastq_compression_possible(&data));

        touch(&data.pending_path);
        assert!(!CrunchyApi::is_fastq_compression_possible(&data));
        std::fs::remove_file(&data.pending_path).unwrap();

        touch(&data.spring_path);
        assert!(!CrunchyApi::is_fastq_compression_possible(&data));
    }

    #[test]
    fn test_decompression_possible_states() {
        let dir = TempDir::new().unwrap();
        let data = CompressionData::from_fastq_first(&dir.path().join("run_R1_001.fastq.gz")).unwrap();

        assert!(!CrunchyApi::is_spring_decompression_possible(&data));

        touch(&data.spring_path);
        assert!(CrunchyApi::is_spring_decompression_possible(&data));

        touch(&data.fastq_first);
        touch(&data.fastq_second);
        assert!(!CrunchyApi::is_spring_decompression_possible(&data));
    }

    #[test]
    fn test_compression_done_respects_delta() {
        let dir = TempDir::new().unwrap();
        let data = CompressionData::from_fastq_first(&dir.path().join("run_R1_001.fastq.gz")).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        assert!(!CrunchyApi::is_fastq_compression_done_on(&data, today).unwrap());

        touch(&data.spring_path);
        std::fs::write(&data.spring_metadata_path, metadata(None, dir.path())).unwrap();
        assert!(CrunchyApi::is_fastq_compression_done_on(&data, today).unwrap());

        std::fs::write(&data.spring_metadata_path, metadata(Some("2026-10-01"), dir.path())).unwrap();
        assert!(!CrunchyApi::is_fastq_compression_done_on(&data, today).unwrap());

        std::fs::write(&data.spring_metadata_path, metadata(Some("2026-09-28"), dir.path())).unwrap();
        assert!(CrunchyApi::is_fastq_compression_done_on(&data, today).unwrap());
    }

    #[test]
    fn test_malformed_metadata_is_an_error() {
        let dir = TempDir::new().unwrap();
        let data = CompressionData::from_fastq_first(&dir.path().join("run_R1_001.fastq.gz")).unwrap();
        touch(&data.spring_path);
        std::fs::write(&data.spring_metadata_path, "not json").unwrap();

        assert!(CrunchyApi::is_fastq_compression_done(&data).is_err());
    }

    #[test]
    fn test_decompression_done_requires_updated() {
        let dir = TempDir::new().unwrap();
        let data = CompressionData::from_fastq_first(&dir.path().join("run_R1_001.fastq.gz")).unwrap();
        touch(&data.fastq_first);
        touch(&data.fastq_second);
        touch(&data.spring_path);

        std::fs::write(&data.spring_metadata_path, metadata(None, dir.path())).unwrap();
        assert!(!CrunchyApi::is_spring_decompression_done(&data).unwrap());

        std::fs::write(&data.spring_metadata_path, metadata(Some("2026-10-01"), dir.path())).unwrap();
        assert!(CrunchyApi::is_spring_decompression_done(&data).unwrap());
    }

    #[test]
    fn test_check_if_update_spring_boundary() {
        let updated = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(check_if_update_spring(updated, NaiveDate::from_ymd_opt(2026, 1, 22).unwrap()));
        assert!(!check_if_update_spring(updated, NaiveDate::from_ymd_opt(2026, 1, 21).unwrap()));
    }

    #[tokio::test]
    async fn test_compress_fastq_dry_run() {
        let root = TempDir::new().unwrap();
        let sample_dir = root.path().join("ACC1");
        std::fs::create_dir_all(sample_dir.join("lane1")).unwrap();
        touch(&sample_dir.join("lane1/run_R1_001.fastq.gz"));
        touch(&sample_dir.join("lane1/run_R2_001.fastq.gz"));

        let api = CrunchyApi::new(&config(root.path()), true);
        assert!(api.compress_fastq("ACC1").await.unwrap());
        assert!(!sample_dir.join("lane1/run.crunchy.pending.txt").exists());

        assert!(!api.compress_fastq("ACC2").await.unwrap());
    }

    #[test]
    fn test_clean_fastq_removes_compressed_pairs() {
        let root = TempDir::new().unwrap();
        let sample_dir = root.path().join("ACC1");
        std::fs::create_dir_all(&sample_dir).unwrap();
        let data = CompressionData::from_fastq_first(&sample_dir.join("run_R1_001.fastq.gz")).unwrap();
        touch(&data.fastq_first);
        touch(&data.fastq_second);
        touch(&data.spring_path);
        std::fs::write(&data.spring_metadata_path, metadata(None, &sample_dir)).unwrap();

        let dry = CrunchyApi::new(&config(root.path()), true);
        assert!(dry.clean_fastq("ACC1").unwrap());
        assert!(data.fastq_first.exists());

        let api = CrunchyApi::new(&config(root.path()), false);
        assert!(api.clean_fastq("ACC1").unwrap());
        assert!(!data.fastq_first.exists());
        assert!(!data.fastq_second.exists());
        assert!(data.spring_path.exists());
    }
}

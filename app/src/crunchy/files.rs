// ==============================================================================
// files.rs - SPRING Metadata Files
// ==============================================================================
// Description: Read, validate and update crunchy SPRING metadata
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::CrunchyError;

/// Which part of a SPRING archive a metadata entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrunchyFileKind {
    FirstRead,
    SecondRead,
    Spring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrunchyFile {
    pub path: PathBuf,
    pub file: CrunchyFileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrunchyMetadata {
    pub files: Vec<CrunchyFile>,
}

/// The three files of a SPRING archive, keyed by role
#[derive(Debug, Clone, PartialEq)]
pub struct SpringArchiveFiles {
    pub fastq_first: CrunchyFile,
    pub fastq_second: CrunchyFile,
    pub spring: CrunchyFile,
}

/// Read and validate a SPRING metadata file
pub fn get_crunchy_metadata(metadata_path: &Path) -> Result<CrunchyMetadata, CrunchyError> {
    info!("Fetch SPRING metadata from {}", metadata_path.display());

    let content = std::fs::read_to_string(metadata_path).map_err(|source| CrunchyError::Io {
        path: metadata_path.to_path_buf(),
        source,
    })?;

    let files: Vec<CrunchyFile> = serde_json::from_str(&content).map_err(|e| {
        warn!("No content in SPRING metadata file {}", metadata_path.display());
        CrunchyError::MalformedMetadata {
            path: metadata_path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    if files.len() != 3 {
        warn!(
            "Wrong number of files in SPRING metadata file {}: found {}, should always be 3",
            metadata_path.display(),
            files.len()
        );
        return Err(CrunchyError::WrongFileCount {
            path: metadata_path.to_path_buf(),
            count: files.len(),
        });
    }

    Ok(CrunchyMetadata { files })
}

/// Date the archive was last unpacked, if ever
pub fn get_file_updated_at(metadata: &CrunchyMetadata) -> Option<NaiveDate> {
    metadata.files.first().and_then(|f| f.updated)
}

pub fn get_spring_archive_files(metadata: &CrunchyMetadata) -> Result<SpringArchiveFiles, CrunchyError> {
    let find = |kind: CrunchyFileKind| {
        metadata
            .files
            .iter()
            .find(|f| f.file == kind)
            .cloned()
            .ok_or(CrunchyError::MissingArchiveFile(kind))
    };

    Ok(SpringArchiveFiles {
        fastq_first: find(CrunchyFileKind::FirstRead)?,
        fastq_second: find(CrunchyFileKind::SecondRead)?,
        spring: find(CrunchyFileKind::Spring)?,
    })
}

/// Stamp today's date on every entry of a metadata file
pub fn update_metadata_date(metadata_path: &Path) -> Result<(), CrunchyError> {
    update_metadata_date_to(metadata_path, Utc::now().date_naive())
}

fn update_metadata_date_to(metadata_path: &Path, date: NaiveDate) -> Result<(), CrunchyError> {
    let mut metadata = get_crunchy_metadata(metadata_path)?;
    info!("Adding today date to SPRING metadata file");

    for file in metadata.files.iter_mut() {
        file.updated = Some(date);
    }

    let content = serde_json::to_string(&metadata.files).map_err(|e| CrunchyError::MalformedMetadata {
        path: metadata_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    std::fs::write(metadata_path, content).map_err(|source| CrunchyError::Io {
        path: metadata_path.to_path_buf(),
        source,
    })
}

/// Compare a file's sha256 with the checksum recorded at compression time
pub fn verify_checksum(path: &Path, expected: &str) -> Result<bool, CrunchyError> {
    let io_err = |source| CrunchyError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let actual = format!("{:x}", hasher.finalize());
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}

/// SLURM logs live next to the SPRING archive
pub fn get_log_dir(spring_path: &Path) -> PathBuf {
    spring_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Unique scratch directory name; the batch job creates it
pub fn get_tmp_dir(prefix: &str, suffix: &str, base: &Path) -> PathBuf {
    base.join(format!("{}{}{}", prefix, Uuid::new_v4().simple(), suffix))
}

pub fn get_fastq_to_spring_sbatch_path(log_dir: &Path, run_name: &str) -> PathBuf {
    log_dir.join(format!("{}_compress_fastq.sh", run_name))
}

pub fn get_spring_to_fastq_sbatch_path(log_dir: &Path, run_name: &str) -> PathBuf {
    log_dir.join(format!("{}_decompress_spring.sh", run_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const METADATA: &str = r#"[
        {"path": "/data/run_R1_001.fastq.gz", "file": "first_read", "checksum": "aaa", "algorithm": "sha256"},
        {"path": "/data/run_R2_001.fastq.gz", "file": "second_read", "checksum": "bbb", "algorithm": "sha256"},
        {"path": "/data/run.spring", "file": "spring"}
    ]"#;

    fn metadata_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_valid_metadata() {
        let file = metadata_file(METADATA);
        let metadata = get_crunchy_metadata(file.path()).unwrap();
        assert_eq!(metadata.files.len(), 3);
        assert_eq!(get_file_updated_at(&metadata), None);

        let archive = get_spring_archive_files(&metadata).unwrap();
        assert_eq!(archive.fastq_first.checksum.as_deref(), Some("aaa"));
        assert_eq!(archive.spring.path, PathBuf::from("/data/run.spring"));
    }

    #[test]
    fn test_empty_metadata_is_malformed() {
        let file = metadata_file("");
        assert!(matches!(
            get_crunchy_metadata(file.path()),
            Err(CrunchyError::MalformedMetadata { .. })
        ));
    }

    #[test]
    fn test_wrong_file_count() {
        let file = metadata_file(r#"[{"path": "/data/run.spring", "file": "spring"}]"#);
        assert!(matches!(
            get_crunchy_metadata(file.path()),
            Err(CrunchyError::WrongFileCount { count: 1, .. })
        ));
    }

    #[test]
    fn test_update_metadata_date() {
        let file = metadata_file(METADATA);
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        update_metadata_date_to(file.path(), date).unwrap();

        let metadata = get_crunchy_metadata(file.path()).unwrap();
        assert!(metadata.files.iter().all(|f| f.updated == Some(date)));

        let raw = std::fs::read_to_string(file.path()).unwrap();
        assert!(raw.contains("\"2026-03-14\""));
    }

    #[test]
    fn test_verify_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reads.fastq.gz");
        std::fs::write(&path, b"abc").unwrap();

        let sha_abc = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert!(verify_checksum(&path, sha_abc).unwrap());
        assert!(!verify_checksum(&path, "deadbeef").unwrap());
    }

    #[test]
    fn test_paths() {
        let spring = Path::new("/fastq/ACC1/run.spring");
        let log_dir = get_log_dir(spring);
        assert_eq!(log_dir, PathBuf::from("/fastq/ACC1"));
        assert_eq!(
            get_fastq_to_spring_sbatch_path(&log_dir, "run"),
            PathBuf::from("/fastq/ACC1/run_compress_fastq.sh")
        );

        let tmp = get_tmp_dir("spring_", "_compress", &log_dir);
        let name = tmp.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("spring_") && name.ends_with("_compress"));
    }
}

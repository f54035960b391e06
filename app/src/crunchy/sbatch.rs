// ==============================================================================
// sbatch.rs - Crunchy Batch Commands
// ==============================================================================
// Description: Shell bodies for compression and decompression jobs
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::Path;

pub struct CompressCommand<'a> {
    pub conda_env: &'a str,
    pub tmp_dir: &'a Path,
    pub fastq_first: &'a Path,
    pub fastq_second: &'a Path,
    pub spring_path: &'a Path,
    pub pending_path: &'a Path,
    pub ntasks: u32,
}

pub struct DecompressCommand<'a> {
    pub conda_env: &'a str,
    pub tmp_dir: &'a Path,
    pub fastq_first: &'a Path,
    pub fastq_second: &'a Path,
    pub spring_path: &'a Path,
    pub pending_path: &'a Path,
    pub checksum_first: &'a str,
    pub checksum_second: &'a str,
    pub ntasks: u32,
}

pub fn fastq_to_spring_commands(c: &CompressCommand<'_>) -> String {
    format!(
        "mkdir -p {tmp_dir}\n\
         conda run -n {env} crunchy -t {ntasks} compress fastq \\\n    \
         --first-read {first} \\\n    \
         --second-read {second} \\\n    \
         --spring-path {spring} \\\n    \
         --metadata-file \\\n    \
         --check-integrity \\\n    \
         --tmp-dir {tmp_dir}\n\
         rm -rf {tmp_dir}\n\
         rm {pending}",
        tmp_dir = c.tmp_dir.display(),
        env = c.conda_env,
        ntasks = c.ntasks,
        first = c.fastq_first.display(),
        second = c.fastq_second.display(),
        spring = c.spring_path.display(),
        pending = c.pending_path.display(),
    )
}

/// Cleanup for a failed compression: drop the half written archive
pub fn fastq_to_spring_error(spring_path: &Path, pending_path: &Path) -> String {
    format!(
        "    if [[ -e {spring} ]]\n    then\n        rm {spring}\n    fi\n\
         \n    if [[ -e {pending} ]]\n    then\n        rm {pending}\n    fi",
        spring = spring_path.display(),
        pending = pending_path.display(),
    )
}

pub fn spring_to_fastq_commands(c: &DecompressCommand<'_>) -> String {
    format!(
        "mkdir -p {tmp_dir}\n\
         conda run -n {env} crunchy -t {ntasks} decompress spring {spring} \\\n    \
         --first {first} \\\n    \
         --second {second} \\\n    \
         --first-checksum {checksum_first} \\\n    \
         --second-checksum {checksum_second}\n\
         rm -rf {tmp_dir}\n\
         rm {pending}",
        tmp_dir = c.tmp_dir.display(),
        env = c.conda_env,
        ntasks = c.ntasks,
        spring = c.spring_path.display(),
        first = c.fastq_first.display(),
        second = c.fastq_second.display(),
        checksum_first = c.checksum_first,
        checksum_second = c.checksum_second,
        pending = c.pending_path.display(),
    )
}

/// Cleanup for a failed decompression: drop partial FASTQ files
pub fn spring_to_fastq_error(fastq_first: &Path, fastq_second: &Path, pending_path: &Path) -> String {
    format!(
        "    if [[ -e {first} ]]\n    then\n        rm {first}\n    fi\n\
         \n    if [[ -e {second} ]]\n    then\n        rm {second}\n    fi\n\
         \n    if [[ -e {pending} ]]\n    then\n        rm {pending}\n    fi",
        first = fastq_first.display(),
        second = fastq_second.display(),
        pending = pending_path.display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompress_includes_checksums() {
        let commands = spring_to_fastq_commands(&DecompressCommand {
            conda_env: "S_crunchy",
            tmp_dir: Path::new("/tmp/spring_x_decompress"),
            fastq_first: Path::new("/f/run_R1_001.fastq.gz"),
            fastq_second: Path::new("/f/run_R2_001.fastq.gz"),
            spring_path: Path::new("/f/run.spring"),
            pending_path: Path::new("/f/run.crunchy.pending.txt"),
            checksum_first: "aaa",
            checksum_second: "bbb",
            ntasks: 12,
        });

        assert!(commands.contains("conda run -n S_crunchy crunchy -t 12 decompress spring /f/run.spring"));
        assert!(commands.contains("--first-checksum aaa"));
        assert!(commands.contains("--second-checksum bbb"));
        assert!(commands.ends_with("rm /f/run.crunchy.pending.txt"));
    }

    #[test]
    fn test_compress_error_removes_archive_and_flag() {
        let error = fastq_to_spring_error(Path::new("/f/run.spring"), Path::new("/f/run.pending"));
        assert!(error.contains("rm /f/run.spring"));
        assert!(error.contains("rm /f/run.pending"));
    }
}

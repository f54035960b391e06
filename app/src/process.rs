// ==============================================================================
// process.rs - External Tool Runner
// ==============================================================================
// Description: Runs command line tools (optionally inside a conda env)
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().filter(|l| !l.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Process {
    binary: String,
    config: Option<PathBuf>,
    environment: Option<String>,
    config_parameter: String,
}

impl Process {
    pub fn new(binary: impl Into<String>, config: Option<PathBuf>, environment: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            config,
            environment,
            config_parameter: "--config".to_string(),
        }
    }

    /// Some tools take their config through a short flag
    pub fn with_config_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.config_parameter = parameter.into();
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Full argv, conda wrapper and config flag included
    pub fn command_line(&self, args: &[&str]) -> Vec<String> {
        let mut argv = Vec::new();

        if let Some(env) = &self.environment {
            argv.extend(["conda", "run", "-n"].map(String::from));
            argv.push(env.clone());
        }

        argv.push(self.binary.clone());

        if let Some(config) = &self.config {
            argv.push(self.config_parameter.clone());
            argv.push(config.display().to_string());
        }

        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    pub async fn run_command(&self, args: &[&str], dry_run: bool) -> Result<ProcessOutput, ProcessError> {
        let argv = self.command_line(args);
        info!("Running command {}", argv.join(" "));

        if dry_run {
            return Ok(ProcessOutput::default());
        }

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                binary: argv[0].clone(),
                source,
            })?;

        let result = ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        for line in result.stdout_lines() {
            info!("{} output: {}", self.binary, line);
        }
        for line in result.stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!("{} stderr: {}", self.binary, line);
        }

        if !output.status.success() {
            return Err(ProcessError::Failed {
                code: output.status.code(),
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log lines
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_command_line_with_conda_and_config() {
        let process = Process::new("chanjo", Some(PathBuf::from("/etc/chanjo.yaml")), Some("S_chanjo".to_string()));
        let argv = process.command_line(&["db", "remove", "ADM1"]);
        assert_eq!(
            argv,
            vec!["conda", "run", "-n", "S_chanjo", "chanjo", "--config", "/etc/chanjo.yaml", "db", "remove", "ADM1"]
        );
    }

    #[test]
    fn test_command_line_plain() {
        let process = Process::new("sbatch", None, None);
        assert_eq!(process.command_line(&["job.sh"]), vec!["sbatch", "job.sh"]);
    }

    #[test]
    fn test_custom_config_parameter() {
        let process = Process::new("scout", Some(PathBuf::from("s.yaml")), None).with_config_parameter("-c");
        assert_eq!(process.command_line(&[]), vec!["scout", "-c", "s.yaml"]);
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let process = Process::new("echo", None, None);
        let output = process.run_command(&["hello"], false).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let process = Process::new("sh", None, None);
        let err = process.run_command(&["-c", "echo broken >&2; exit 3"], false).await.unwrap_err();
        match err {
            ProcessError::Failed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_dry_run_does_not_spawn() {
        let process = Process::new("definitely-not-a-binary", None, None);
        let output = process.run_command(&["x"], true).await.unwrap();
        assert!(output.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_output_lines_logged_at_info() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let process = Process::new("echo", None, None);
        process.run_command(&["sample ADM1 loaded"], false).await.unwrap();

        let logged = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("echo output: sample ADM1 loaded"));
    }
}

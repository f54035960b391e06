// ==============================================================================
// vogue.rs - Trending Portal Wrapper
// ==============================================================================
// Description: Loads genotype, application tag and flowcell data into vogue
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::UploadError;
use crate::process::{Process, ProcessError, ProcessOutput};
use crate::store::Store;

pub struct VogueApi {
    process: Process,
    dry_run: bool,
}

impl VogueApi {
    pub fn new(binary: &str) -> Self {
        Self {
            process: Process::new(binary, None, None),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    async fn run(&self, args: &[&str]) -> Result<(), ProcessError> {
        let output = self.process.run_command(args, self.dry_run).await?;
        for line in output.stdout_lines() {
            info!("vogue output: {}", line);
        }
        Ok(())
    }

    pub async fn load_genotype_data(&self, genotype: &Value) -> Result<(), ProcessError> {
        let payload = genotype.to_string();
        self.run(&["load", "genotype", "-s", payload.as_str()]).await
    }

    pub async fn load_apptags(&self, apptags: &[VogueApptag]) -> Result<(), ProcessError> {
        let payload = apptag_payload(apptags);
        self.run(&["load", "apptag", payload.as_str()]).await
    }

    pub async fn load_flowcells(&self, days: u32) -> Result<(), ProcessError> {
        let days = days.to_string();
        self.run(&["load", "flowcell", "-d", days.as_str()]).await
    }
}

/// Exports from the genotype database
pub struct GenotypeApi {
    process: Process,
    dry_run: bool,
}

impl GenotypeApi {
    pub fn new(binary: &str) -> Self {
        Self {
            process: Process::new(binary, None, None),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    async fn export(&self, command: &str, days: u32) -> Result<ProcessOutput, ProcessError> {
        let days = days.to_string();
        self.process.run_command(&[command, "-d", days.as_str()], self.dry_run).await
    }

    pub async fn export_sample(&self, days: u32) -> Result<ProcessOutput, ProcessError> {
        self.export("export-sample", days).await
    }

    pub async fn export_sample_analysis(&self, days: u32) -> Result<ProcessOutput, ProcessError> {
        self.export("export-sample-analysis", days).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VogueApptag {
    pub tag: String,
    pub prep_category: String,
}

fn apptag_payload(apptags: &[VogueApptag]) -> String {
    Value::Array(
        apptags
            .iter()
            .map(|t| json!({"tag": t.tag, "prep_category": t.prep_category}))
            .collect(),
    )
    .to_string()
}

/// Turn a `{sample_id: {...}}` export into documents keyed by `_id`
pub fn genotype_documents(export: &str) -> Result<Vec<Value>, UploadError> {
    if export.trim().is_empty() {
        return Ok(Vec::new());
    }

    let samples: Map<String, Value> = serde_json::from_str(export)?;
    Ok(samples
        .into_iter()
        .map(|(sample_id, mut document)| {
            if let Value::Object(fields) = &mut document {
                fields.insert("_id".to_string(), Value::String(sample_id));
            }
            document
        })
        .collect())
}

pub struct UploadVogueApi<'a> {
    store: &'a Store,
    genotype: GenotypeApi,
    vogue: VogueApi,
}

impl<'a> UploadVogueApi<'a> {
    pub fn new(store: &'a Store, genotype: GenotypeApi, vogue: VogueApi) -> Self {
        Self { store, genotype, vogue }
    }

    /// Load sample and sample analysis genotypes changed in the last `days`
    pub async fn load_genotype(&self, days: u32) -> Result<usize, UploadError> {
        let mut loaded = 0;

        for export in [
            self.genotype.export_sample(days).await?,
            self.genotype.export_sample_analysis(days).await?,
        ] {
            for document in genotype_documents(&export.stdout)? {
                self.vogue.load_genotype_data(&document).await?;
                loaded += 1;
            }
        }

        info!("Loaded {} genotype documents into vogue", loaded);
        Ok(loaded)
    }

    pub async fn load_apptags(&self) -> Result<usize, UploadError> {
        let apptags: Vec<VogueApptag> = self
            .store
            .applications(None, None)
            .await?
            .into_iter()
            .map(|app| VogueApptag {
                tag: app.tag,
                prep_category: app.prep_category,
            })
            .collect();

        self.vogue.load_apptags(&apptags).await?;
        Ok(apptags.len())
    }

    pub async fn load_flowcells(&self, days: u32) -> Result<(), UploadError> {
        self.vogue.load_flowcells(days).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genotype_documents_get_ids() {
        let export = r#"{"ACC1": {"status": "pass", "snps": {"rs1": ["A", "G"]}}, "ACC2": {"status": "fail"}}"#;
        let documents = genotype_documents(export).unwrap();

        assert_eq!(documents.len(), 2);
        let ids: Vec<&str> = documents.iter().filter_map(|d| d["_id"].as_str()).collect();
        assert!(ids.contains(&"ACC1"));
        assert!(ids.contains(&"ACC2"));
        assert!(documents.iter().any(|d| d["status"] == "fail"));
    }

    #[test]
    fn test_empty_export_has_no_documents() {
        assert!(genotype_documents("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_export_is_an_error() {
        assert!(matches!(genotype_documents("not json"), Err(UploadError::Json(_))));
    }

    #[test]
    fn test_apptag_payload() {
        let tags = vec![VogueApptag {
            tag: "WGSPCFC030".to_string(),
            prep_category: "wgs".to_string(),
        }];
        let payload: Value = serde_json::from_str(&apptag_payload(&tags)).unwrap();
        assert_eq!(payload, json!([{"tag": "WGSPCFC030", "prep_category": "wgs"}]));
    }

    #[test]
    fn test_flowcell_command_line() {
        let api = VogueApi::new("vogue");
        assert_eq!(
            api.process().command_line(&["load", "flowcell", "-d", "7"]),
            vec!["vogue", "load", "flowcell", "-d", "7"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_loads_nothing() {
        let api = VogueApi::new("vogue").with_dry_run(true);
        api.load_flowcells(7).await.unwrap();
        api.load_genotype_data(&serde_json::json!({"_id": "ACC1"})).await.unwrap();
    }
}

// ==============================================================================
// mod.rs - Order Validation and Intake
// ==============================================================================
// Description: Order types, per-type field validation and submission of
//              validated orders into the status database
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod csv;
pub mod json;

pub use self::csv::CsvOrderformParser;
pub use self::json::JsonOrderformParser;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::audit::{self, AuditEventType};
use crate::constants::{
    DataDelivery, PhenotypeStatus, Pipeline, Priority, Sex, UnknownOption, CAPTUREKIT_OPTIONS,
    CONTAINER_OPTIONS, NAME_PATTERN, SOURCE_TYPES,
};
use crate::models::{Customer, Family, Pool, Sample};
use crate::store::{NewCase, NewPool, NewSample, Store, StoreError};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(NAME_PATTERN).expect("valid name regex"));

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("{sample}: {field} {reason}")]
    Invalid {
        sample: String,
        field: &'static str,
        reason: String,
    },

    #[error("Order has no samples")]
    NoSamples,

    #[error("Order rejected with {} error(s): {}", .0.len(), join_errors(.0))]
    Rejected(Vec<OrderError>),

    #[error("Malformed orderform: {0}")]
    Malformed(String),

    #[error("Invalid order JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid orderform CSV: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    UnknownOption(#[from] UnknownOption),

    #[error("Unknown customer: {0}")]
    UnknownCustomer(String),

    #[error("Unknown application: {0}")]
    UnknownApplication(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn join_errors(errors: &[OrderError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Kinds of orders the intake accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "external")]
    External,
    #[serde(rename = "fastq")]
    Fastq,
    #[serde(rename = "rml")]
    Rml,
    #[serde(rename = "mip")]
    Mip,
    #[serde(rename = "mip_rna")]
    MipRna,
    #[serde(rename = "microsalt")]
    Microsalt,
    #[serde(rename = "metagenome")]
    Metagenome,
    #[serde(rename = "balsamic")]
    Balsamic,
    #[serde(rename = "mip_balsamic")]
    MipBalsamic,
    #[serde(rename = "sars-cov-2")]
    SarsCov2,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::External => "external",
            OrderType::Fastq => "fastq",
            OrderType::Rml => "rml",
            OrderType::Mip => "mip",
            OrderType::MipRna => "mip_rna",
            OrderType::Microsalt => "microsalt",
            OrderType::Metagenome => "metagenome",
            OrderType::Balsamic => "balsamic",
            OrderType::MipBalsamic => "mip_balsamic",
            OrderType::SarsCov2 => "sars-cov-2",
        }
    }

    /// Orders whose samples are grouped into cases by family name
    pub fn groups_by_family(&self) -> bool {
        matches!(
            self,
            OrderType::Mip | OrderType::Balsamic | OrderType::MipBalsamic | OrderType::External | OrderType::MipRna
        )
    }

    /// Check every sample of an order, collecting all problems
    pub fn validate(&self, order: &Order) -> Result<(), Vec<OrderError>> {
        if order.samples.is_empty() {
            return Err(vec![OrderError::NoSamples]);
        }

        let mut errors = Vec::new();
        for sample in &order.samples {
            let mut checks = SampleChecks::new(&sample.name);
            checks.pattern("name", Some(&sample.name));
            checks.require("application", sample.application.as_deref());
            checks.require("data_analysis", sample.data_analysis.as_deref());
            if let Some(analysis) = sample.data_analysis.as_deref() {
                checks.parsed("data_analysis", parse_pipeline(analysis));
            }
            if let Some(delivery) = sample.data_delivery.as_deref() {
                checks.parsed("data_delivery", delivery.parse::<DataDelivery>());
            }
            checks.pattern("mother", sample.mother.as_deref());
            checks.pattern("father", sample.father.as_deref());
            checks.one_of("container", sample.container.as_deref(), CONTAINER_OPTIONS);
            checks.one_of("capture_kit", sample.capture_kit.as_deref(), CAPTUREKIT_OPTIONS);
            if let Some(sex) = sample.sex.as_deref() {
                checks.parsed("sex", sex.parse::<Sex>());
            }
            if let Some(status) = sample.status.as_deref() {
                checks.parsed("status", status.parse::<PhenotypeStatus>());
            }
            if let Some(priority) = sample.priority.as_deref() {
                checks.parsed("priority", priority.parse::<Priority>());
            }
            self.check_required(sample, &mut checks);
            errors.extend(checks.errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_required(&self, sample: &OrderSample, checks: &mut SampleChecks<'_>) {
        match self {
            OrderType::Mip | OrderType::MipBalsamic => {
                checks.require("family_name", sample.family_name.as_deref());
                checks.pattern("family_name", sample.family_name.as_deref());
                checks.require_flag("require_qcok", sample.require_qcok);
                checks.require_flag("tumour", sample.tumour);
                checks.require("status", sample.status.as_deref());
                if sample.panels.is_empty() {
                    checks.fail("panels", "needs at least one panel");
                }
            }
            OrderType::Balsamic => {
                checks.require("family_name", sample.family_name.as_deref());
                checks.pattern("family_name", sample.family_name.as_deref());
                checks.require_flag("require_qcok", sample.require_qcok);
                checks.require_flag("tumour", sample.tumour);
            }
            OrderType::External => {
                checks.require("family_name", sample.family_name.as_deref());
                checks.pattern("family_name", sample.family_name.as_deref());
            }
            OrderType::MipRna => {
                checks.require("family_name", sample.family_name.as_deref());
                checks.pattern("family_name", sample.family_name.as_deref());
                checks.pattern("from_sample", sample.from_sample.as_deref());
            }
            OrderType::Fastq => {
                checks.require_flag("require_qcok", sample.require_qcok);
                checks.require_flag("tumour", sample.tumour);
                checks.require("source", sample.source.as_deref());
            }
            OrderType::Rml => {
                checks.require("priority", sample.priority.as_deref());
                checks.require("pool", sample.pool.as_deref());
                checks.require("volume", sample.volume.as_deref());
                checks.require("concentration", sample.concentration.as_deref());
                checks.require("index", sample.index.as_deref());
            }
            OrderType::Microsalt | OrderType::SarsCov2 => {
                checks.require("organism", sample.organism.as_deref());
                checks.require("reference_genome", sample.reference_genome.as_deref());
                checks.require_flag("require_qcok", sample.require_qcok);
                checks.require("elution_buffer", sample.elution_buffer.as_deref());
                checks.require("extraction_method", sample.extraction_method.as_deref());
            }
            OrderType::Metagenome => {
                checks.require_flag("require_qcok", sample.require_qcok);
                checks.require("elution_buffer", sample.elution_buffer.as_deref());
                checks.require("source", sample.source.as_deref());
            }
        }

        if let Some(source) = sample.source.as_deref() {
            checks.one_of("source", Some(source), SOURCE_TYPES);
        }
    }
}

impl FromStr for OrderType {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "external" => Ok(OrderType::External),
            "fastq" => Ok(OrderType::Fastq),
            "rml" => Ok(OrderType::Rml),
            "mip" => Ok(OrderType::Mip),
            "mip_rna" | "mip-rna" => Ok(OrderType::MipRna),
            "microsalt" | "microbial" => Ok(OrderType::Microsalt),
            "metagenome" => Ok(OrderType::Metagenome),
            "balsamic" => Ok(OrderType::Balsamic),
            "mip_balsamic" => Ok(OrderType::MipBalsamic),
            "sars-cov-2" | "sars_cov_2" => Ok(OrderType::SarsCov2),
            _ => Err(UnknownOption {
                kind: "order type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map orderform analysis names ("MIP DNA", "No analysis", "FLUFFY") onto
/// pipelines
pub fn parse_pipeline(value: &str) -> Result<Pipeline, UnknownOption> {
    let normalised = value.trim().to_lowercase().replace(' ', "-");
    if normalised == "no-analysis" {
        return Ok(Pipeline::Fastq);
    }
    normalised.parse()
}

struct SampleChecks<'a> {
    sample: &'a str,
    errors: Vec<OrderError>,
}

impl<'a> SampleChecks<'a> {
    fn new(sample: &'a str) -> Self {
        Self {
            sample,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, field: &'static str, reason: impl Into<String>) {
        self.errors.push(OrderError::Invalid {
            sample: self.sample.to_string(),
            field,
            reason: reason.into(),
        });
    }

    fn require(&mut self, field: &'static str, value: Option<&str>) {
        if value.map_or(true, |v| v.trim().is_empty()) {
            self.fail(field, "is required");
        }
    }

    fn require_flag(&mut self, field: &'static str, value: Option<bool>) {
        if value.is_none() {
            self.fail(field, "is required");
        }
    }

    fn pattern(&mut self, field: &'static str, value: Option<&str>) {
        if let Some(value) = value {
            if !NAME_RE.is_match(value) {
                self.fail(field, format!("'{}' may only contain letters, digits and dashes", value));
            }
        }
    }

    fn one_of(&mut self, field: &'static str, value: Option<&str>, options: &[&str]) {
        if let Some(value) = value {
            if !options.contains(&value) {
                self.fail(field, format!("'{}' is not a valid option", value));
            }
        }
    }

    fn parsed<T>(&mut self, field: &'static str, result: Result<T, UnknownOption>) {
        if let Err(e) = result {
            self.fail(field, e.to_string());
        }
    }
}

/// Accept strings, numbers and booleans for free-text fields
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    let value = Option::<Text>::deserialize(deserializer)?.map(|t| match t {
        Text::Str(s) => s,
        Text::Int(i) => i.to_string(),
        Text::Float(f) => f.to_string(),
        Text::Bool(b) => b.to_string(),
    });
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn ticket<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    match text(deserializer)? {
        Some(value) => value
            .trim()
            .trim_start_matches('#')
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid ticket number: {}", value))),
        None => Ok(None),
    }
}

fn panels<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One sample row of an order. Everything is optional here; the order type
/// decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSample {
    pub name: String,
    #[serde(default)]
    pub internal_id: Option<String>,
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub data_analysis: Option<String>,
    #[serde(default)]
    pub data_delivery: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub mother: Option<String>,
    #[serde(default)]
    pub father: Option<String>,
    #[serde(default, deserialize_with = "panels")]
    pub panels: Vec<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub well_position: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tumour: Option<bool>,
    #[serde(default)]
    pub require_qcok: Option<bool>,
    #[serde(default)]
    pub capture_kit: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub tumour_purity: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub formalin_fixation_time: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub post_formalin_fixation_time: Option<String>,
    #[serde(default)]
    pub tissue_block_size: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub quantity: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub volume: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub concentration: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub concentration_sample: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub index_number: Option<String>,
    #[serde(default)]
    pub index_sequence: Option<String>,
    #[serde(default)]
    pub rml_plate_name: Option<String>,
    #[serde(default)]
    pub well_position_rml: Option<String>,
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub organism_other: Option<String>,
    #[serde(default)]
    pub reference_genome: Option<String>,
    #[serde(default)]
    pub elution_buffer: Option<String>,
    #[serde(default)]
    pub extraction_method: Option<String>,
    #[serde(default)]
    pub from_sample: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub time_point: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub phenotype_terms: Vec<String>,
    #[serde(default, deserialize_with = "text")]
    pub age_at_sampling: Option<String>,
}

impl OrderSample {
    fn sex(&self) -> Sex {
        self.sex.as_deref().and_then(|s| s.parse().ok()).unwrap_or(Sex::Unknown)
    }

    fn priority(&self) -> Option<Priority> {
        self.priority.as_deref().and_then(|p| p.parse().ok())
    }

    fn status(&self) -> PhenotypeStatus {
        self.status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(PhenotypeStatus::Unknown)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub name: String,
    pub customer: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "ticket")]
    pub ticket: Option<i32>,
    pub samples: Vec<OrderSample>,
}

/// Records created by a submitted order
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderResult {
    pub cases: Vec<Family>,
    pub samples: Vec<Sample>,
    pub pools: Vec<Pool>,
}

/// Read an order from a portal JSON file or a CSV export of the sheet,
/// picked by extension
pub fn parse_order_file(path: &std::path::Path) -> Result<Order, OrderError> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("json") => JsonOrderformParser::new().parse_file(path),
        Some("csv") => CsvOrderformParser::new().parse_file(path),
        _ => Err(OrderError::Malformed(format!(
            "unsupported orderform {}, expected .json or .csv",
            path.display()
        ))),
    }
}

/// Group items by a key, keeping first-seen key order
fn group_by<'a, T>(items: &'a [T], key: impl Fn(&T) -> String) -> Vec<(String, Vec<&'a T>)> {
    let mut groups: Vec<(String, Vec<&T>)> = Vec::new();
    for item in items {
        let k = key(item);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(item),
            None => groups.push((k, vec![item])),
        }
    }
    groups
}

fn default_delivery(pipeline: Pipeline) -> DataDelivery {
    match pipeline {
        Pipeline::Fastq => DataDelivery::Fastq,
        Pipeline::MipDna | Pipeline::Balsamic => DataDelivery::Scout,
        _ => DataDelivery::Analysis,
    }
}

/// Turns validated orders into customers' cases, samples and pools
pub struct OrdersApi<'a> {
    store: &'a Store,
}

impl<'a> OrdersApi<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub async fn submit(&self, order_type: OrderType, order: &Order, actor: &str) -> Result<OrderResult, OrderError> {
        order_type.validate(order).map_err(OrderError::Rejected)?;

        let customer = self
            .store
            .customer(&order.customer)
            .await?
            .ok_or_else(|| OrderError::UnknownCustomer(order.customer.clone()))?;

        info!(
            "Submitting {} order {} for {} with {} samples",
            order_type,
            order.name,
            customer.internal_id,
            order.samples.len()
        );

        let result = if order_type == OrderType::Rml {
            self.submit_pools(&customer, order).await?
        } else if order_type.groups_by_family() {
            self.submit_cases(&customer, order).await?
        } else {
            self.submit_sample_cases(&customer, order).await?
        };

        audit::log_event(
            self.store.pool(),
            AuditEventType::OrderSubmitted,
            actor,
            Some(order.name.clone()),
            serde_json::json!({
                "order_type": order_type.as_str(),
                "customer": customer.internal_id,
                "ticket": order.ticket,
                "cases": result.cases.iter().map(|c| &c.internal_id).collect::<Vec<_>>(),
                "samples": result.samples.len(),
                "pools": result.pools.len(),
            }),
        )
        .await;

        Ok(result)
    }

    async fn add_order_sample(&self, customer: &Customer, order: &Order, sample: &OrderSample) -> Result<Sample, OrderError> {
        if let Some(internal_id) = &sample.internal_id {
            debug!("Reusing existing sample {}", internal_id);
            return self
                .store
                .sample(internal_id)
                .await?
                .ok_or_else(|| StoreError::not_found("sample", internal_id).into());
        }

        let tag = sample.application.as_deref().unwrap_or_default();
        let version = self
            .store
            .latest_version(tag)
            .await?
            .ok_or_else(|| OrderError::UnknownApplication(tag.to_string()))?;

        let mut new = NewSample::new(&sample.name, sample.sex(), customer.id, version.id);
        new.comment = sample.comment.clone();
        new.order = Some(order.name.clone());
        new.priority = sample.priority();
        new.ticket = order.ticket;
        new.tumour = sample.tumour.unwrap_or(false);

        let created = self.store.add_sample(&new).await?;
        audit::log_event(
            self.store.pool(),
            AuditEventType::SampleAdded,
            "orders",
            Some(created.internal_id.clone()),
            serde_json::json!({ "name": created.name, "order": order.name }),
        )
        .await;
        Ok(created)
    }

    async fn find_or_add_case(
        &self,
        customer: &Customer,
        name: &str,
        samples: &[&OrderSample],
    ) -> Result<Family, OrderError> {
        if let Some(existing) = self.store.find_family(customer.id, name).await? {
            debug!("Reusing case {} ({})", existing.internal_id, name);
            return Ok(existing);
        }

        let first = samples
            .first()
            .ok_or_else(|| OrderError::Malformed(format!("case {} has no samples", name)))?;
        let pipeline = parse_pipeline(first.data_analysis.as_deref().unwrap_or_default())?;
        let delivery = match first.data_delivery.as_deref() {
            Some(d) => d.parse()?,
            None => default_delivery(pipeline),
        };

        let mut new = NewCase::new(customer.id, name, pipeline, delivery);
        for sample in samples {
            for panel in &sample.panels {
                if !new.panels.contains(panel) {
                    new.panels.push(panel.clone());
                }
            }
        }
        new.priority = samples
            .iter()
            .filter_map(|s| s.priority())
            .max()
            .unwrap_or_default();
        new.synopsis = samples.iter().find_map(|s| s.synopsis.clone());

        let case = self.store.add_case(&new).await?;
        info!("Created case {} ({})", case.internal_id, case.name);
        audit::log_event(
            self.store.pool(),
            AuditEventType::CaseCreated,
            "orders",
            Some(case.internal_id.clone()),
            serde_json::json!({ "name": case.name, "data_analysis": case.data_analysis }),
        )
        .await;
        Ok(case)
    }

    async fn submit_cases(&self, customer: &Customer, order: &Order) -> Result<OrderResult, OrderError> {
        let mut result = OrderResult::default();

        for (family_name, members) in group_by(&order.samples, |s| s.family_name.clone().unwrap_or_default()) {
            let case = self.find_or_add_case(customer, &family_name, &members).await?;

            let mut by_name: HashMap<&str, Sample> = HashMap::new();
            for sample in &members {
                let created = self.add_order_sample(customer, order, sample).await?;
                by_name.insert(sample.name.as_str(), created);
            }

            for sample in &members {
                let Some(record) = by_name.get(sample.name.as_str()) else {
                    continue;
                };
                let parent = |name: &Option<String>| name.as_deref().and_then(|n| by_name.get(n)).map(|s| s.id);
                self.store
                    .relate_sample(case.id, record.id, sample.status(), parent(&sample.mother), parent(&sample.father))
                    .await?;
            }

            result.samples.extend(members.iter().filter_map(|s| by_name.remove(s.name.as_str())));
            result.cases.push(case);
        }

        Ok(result)
    }

    /// One case per sample, named after the sample
    async fn submit_sample_cases(&self, customer: &Customer, order: &Order) -> Result<OrderResult, OrderError> {
        let mut result = OrderResult::default();

        for sample in &order.samples {
            let case = self.find_or_add_case(customer, &sample.name, &[sample]).await?;
            let created = self.add_order_sample(customer, order, sample).await?;
            self.store
                .relate_sample(case.id, created.id, PhenotypeStatus::Unknown, None, None)
                .await?;
            result.cases.push(case);
            result.samples.push(created);
        }

        Ok(result)
    }

    async fn submit_pools(&self, customer: &Customer, order: &Order) -> Result<OrderResult, OrderError> {
        let mut result = OrderResult::default();

        for (pool_name, members) in group_by(&order.samples, |s| s.pool.clone().unwrap_or_default()) {
            let tag = members
                .first()
                .and_then(|s| s.application.as_deref())
                .unwrap_or_default();
            let version = self
                .store
                .latest_version(tag)
                .await?
                .ok_or_else(|| OrderError::UnknownApplication(tag.to_string()))?;

            let pool = self
                .store
                .add_pool(&NewPool {
                    customer_id: customer.id,
                    application_version_id: version.id,
                    name: pool_name,
                    order: order.name.clone(),
                    ordered_at: None,
                    ticket: order.ticket,
                    comment: order.comment.clone(),
                    received_at: None,
                    capture_kit: members.iter().find_map(|s| s.capture_kit.clone()),
                })
                .await?;
            info!("Created pool {} with {} libraries", pool.name, members.len());
            result.pools.push(pool);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mip_sample(name: &str) -> OrderSample {
        OrderSample {
            name: name.to_string(),
            application: Some("WGSPCFC030".to_string()),
            data_analysis: Some("MIP DNA".to_string()),
            data_delivery: Some("scout".to_string()),
            family_name: Some("family1".to_string()),
            sex: Some("female".to_string()),
            status: Some("affected".to_string()),
            panels: vec!["OMIM-AUTO".to_string()],
            require_qcok: Some(true),
            tumour: Some(false),
            ..Default::default()
        }
    }

    fn order(samples: Vec<OrderSample>) -> Order {
        Order {
            name: "order1".to_string(),
            customer: "cust000".to_string(),
            comment: None,
            ticket: Some(123456),
            samples,
        }
    }

    fn invalid_fields(errors: &[OrderError]) -> Vec<&'static str> {
        errors
            .iter()
            .filter_map(|e| match e {
                OrderError::Invalid { field, .. } => Some(*field),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_valid_mip_order() {
        assert!(OrderType::Mip.validate(&order(vec![mip_sample("s1")])).is_ok());
    }

    #[test]
    fn test_order_without_samples() {
        let errors = OrderType::Fastq.validate(&order(vec![])).unwrap_err();
        assert!(matches!(errors[0], OrderError::NoSamples));
    }

    #[test]
    fn test_mip_requires_panels_and_family() {
        let mut sample = mip_sample("s1");
        sample.panels.clear();
        sample.family_name = None;

        let errors = OrderType::Mip.validate(&order(vec![sample])).unwrap_err();
        let fields = invalid_fields(&errors);
        assert!(fields.contains(&"panels"));
        assert!(fields.contains(&"family_name"));
    }

    #[test]
    fn test_names_and_parents_follow_pattern() {
        let mut sample = mip_sample("bad name");
        sample.mother = Some("mom_1".to_string());

        let errors = OrderType::Mip.validate(&order(vec![sample])).unwrap_err();
        assert_eq!(invalid_fields(&errors), vec!["name", "mother"]);
        assert_eq!(
            errors[0].to_string(),
            "bad name: name 'bad name' may only contain letters, digits and dashes"
        );
    }

    #[test]
    fn test_enumerated_values() {
        let mut sample = mip_sample("s1");
        sample.container = Some("Bucket".to_string());
        sample.sex = Some("other".to_string());
        sample.priority = Some("urgent".to_string());

        let errors = OrderType::Mip.validate(&order(vec![sample])).unwrap_err();
        assert_eq!(invalid_fields(&errors), vec!["container", "sex", "priority"]);
    }

    #[test]
    fn test_rml_requirements() {
        let sample = OrderSample {
            name: "lib1".to_string(),
            application: Some("RMLP10R300".to_string()),
            data_analysis: Some("FLUFFY".to_string()),
            priority: Some("clinical trials".to_string()),
            pool: Some("pool1".to_string()),
            volume: Some("1".to_string()),
            concentration: Some("2".to_string()),
            ..Default::default()
        };

        let errors = OrderType::Rml.validate(&order(vec![sample])).unwrap_err();
        assert_eq!(invalid_fields(&errors), vec!["index"]);
    }

    #[test]
    fn test_microbial_requirements() {
        let sample = OrderSample {
            name: "m1".to_string(),
            application: Some("MWRNXTR003".to_string()),
            data_analysis: Some("microsalt".to_string()),
            organism: Some("C. difficile".to_string()),
            require_qcok: Some(true),
            ..Default::default()
        };

        let errors = OrderType::Microsalt.validate(&order(vec![sample])).unwrap_err();
        assert_eq!(
            invalid_fields(&errors),
            vec!["reference_genome", "elution_buffer", "extraction_method"]
        );
    }

    #[test]
    fn test_parse_pipeline_names() {
        assert_eq!(parse_pipeline("MIP DNA").unwrap(), Pipeline::MipDna);
        assert_eq!(parse_pipeline("No analysis").unwrap(), Pipeline::Fastq);
        assert_eq!(parse_pipeline("FLUFFY").unwrap(), Pipeline::Fluffy);
        assert!(parse_pipeline("guesswork").is_err());
    }

    #[test]
    fn test_order_type_names() {
        assert_eq!("microbial".parse::<OrderType>().unwrap(), OrderType::Microsalt);
        assert_eq!("sars-cov-2".parse::<OrderType>().unwrap(), OrderType::SarsCov2);
        assert!("excel".parse::<OrderType>().is_err());
        assert!(OrderType::MipRna.groups_by_family());
        assert!(!OrderType::Fastq.groups_by_family());
    }

    #[test]
    fn test_group_by_keeps_first_seen_order() {
        let samples = vec![mip_sample("a"), mip_sample("b")];
        let mut other = mip_sample("c");
        other.family_name = Some("family0".to_string());
        let all = vec![samples[0].clone(), other, samples[1].clone()];

        let groups = group_by(&all, |s| s.family_name.clone().unwrap_or_default());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "family1");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "family0");
    }

    #[test]
    fn test_parse_order_file_by_extension() {
        let temp = tempfile::TempDir::new().unwrap();

        let json_path = temp.path().join("order.json");
        std::fs::write(
            &json_path,
            r#"{"name": "order1", "customer": "cust000", "samples": [{"name": "s1"}]}"#,
        )
        .unwrap();
        let order = parse_order_file(&json_path).unwrap();
        assert_eq!(order.customer, "cust000");
        assert_eq!(order.samples.len(), 1);

        let xlsx_path = temp.path().join("order.xlsx");
        std::fs::write(&xlsx_path, b"PK").unwrap();
        assert!(matches!(parse_order_file(&xlsx_path), Err(OrderError::Malformed(_))));
    }
}

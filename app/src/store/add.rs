// ==============================================================================
// add.rs - Status Database Inserts
// ==============================================================================
// Description: Creates customers, samples, cases, analyses and related records
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Store, StoreError};
use crate::constants::{DataDelivery, PhenotypeStatus, Pipeline, Priority, Sex};
use crate::models::{
    Analysis, Application, ApplicationVersion, Customer, CustomerGroup, Delivery, Family,
    FamilySample, Flowcell, Invoice, Organism, Panel, Pool, Prices, Sample, User,
};
use crate::petname;

/// Attempts before giving up on finding a free identifier
const MAX_NAME_ATTEMPTS: usize = 100;

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub internal_id: String,
    pub name: String,
    pub customer_group_id: i32,
    pub invoice_address: String,
    pub invoice_reference: String,
    pub scout_access: bool,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub tag: String,
    pub category: String,
    pub description: String,
    pub percent_kth: i32,
    pub percent_reads_guaranteed: i32,
    pub is_accredited: bool,
    pub is_external: bool,
    pub target_reads: i64,
}

#[derive(Debug, Clone)]
pub struct NewSample {
    pub name: String,
    pub sex: Sex,
    pub customer_id: i32,
    pub application_version_id: i32,
    pub internal_id: Option<String>,
    pub organism_id: Option<i32>,
    pub comment: Option<String>,
    pub control: Option<String>,
    pub downsampled_to: Option<i64>,
    pub order: Option<String>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub received_at: Option<DateTime<Utc>>,
    pub ticket: Option<i32>,
    pub tumour: bool,
}

impl NewSample {
    pub fn new(name: impl Into<String>, sex: Sex, customer_id: i32, application_version_id: i32) -> Self {
        Self {
            name: name.into(),
            sex,
            customer_id,
            application_version_id,
            internal_id: None,
            organism_id: None,
            comment: None,
            control: None,
            downsampled_to: None,
            order: None,
            ordered_at: None,
            priority: None,
            received_at: None,
            ticket: None,
            tumour: false,
        }
    }

    /// Downsampled samples are research unless told otherwise
    pub fn effective_priority(&self) -> Priority {
        self.priority.unwrap_or(if self.downsampled_to.is_some() {
            Priority::Research
        } else {
            Priority::Standard
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewCase {
    pub customer_id: i32,
    pub name: String,
    pub data_analysis: Pipeline,
    pub data_delivery: DataDelivery,
    pub panels: Vec<String>,
    pub cohorts: Vec<String>,
    pub priority: Priority,
    pub synopsis: Option<String>,
    pub avatar_url: Option<String>,
}

impl NewCase {
    pub fn new(customer_id: i32, name: impl Into<String>, data_analysis: Pipeline, data_delivery: DataDelivery) -> Self {
        Self {
            customer_id,
            name: name.into(),
            data_analysis,
            data_delivery,
            panels: Vec::new(),
            cohorts: Vec::new(),
            priority: Priority::Standard,
            synopsis: None,
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub family_id: i32,
    pub pipeline: Pipeline,
    pub version: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub primary: bool,
}

#[derive(Debug, Clone)]
pub struct NewPool {
    pub customer_id: i32,
    pub application_version_id: i32,
    pub name: String,
    pub order: String,
    pub ordered_at: Option<DateTime<Utc>>,
    pub ticket: Option<i32>,
    pub comment: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub capture_kit: Option<String>,
}

impl Store {
    pub async fn add_customer_group(&self, internal_id: &str, name: &str) -> Result<CustomerGroup, StoreError> {
        let group = sqlx::query_as::<_, CustomerGroup>(
            "INSERT INTO customer_group (internal_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(internal_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(group)
    }

    pub async fn add_customer(&self, new: &NewCustomer) -> Result<Customer, StoreError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customer (
                internal_id, name, customer_group_id, invoice_address,
                invoice_reference, scout_access
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&new.internal_id)
        .bind(&new.name)
        .bind(new.customer_group_id)
        .bind(&new.invoice_address)
        .bind(&new.invoice_reference)
        .bind(new.scout_access)
        .fetch_one(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Create a user and link it to one customer
    pub async fn add_user(&self, customer_id: i32, email: &str, name: &str, is_admin: bool) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO "user" (name, email, is_admin) VALUES ($1, $2, $3) RETURNING *"#,
        )
        .bind(name)
        .bind(email)
        .bind(is_admin)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO customer_user (customer_id, user_id) VALUES ($1, $2)")
            .bind(customer_id)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    pub async fn add_application(&self, new: &NewApplication) -> Result<Application, StoreError> {
        let application = sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO application (
                tag, prep_category, description, percent_kth,
                percent_reads_guaranteed, is_accredited, is_external, target_reads
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&new.tag)
        .bind(&new.category)
        .bind(&new.description)
        .bind(new.percent_kth)
        .bind(new.percent_reads_guaranteed)
        .bind(new.is_accredited)
        .bind(new.is_external)
        .bind(new.target_reads)
        .fetch_one(&self.pool)
        .await?;

        Ok(application)
    }

    /// New application version; every price must be given
    pub async fn add_version(
        &self,
        application_id: i32,
        version: i32,
        valid_from: DateTime<Utc>,
        prices: Prices,
    ) -> Result<ApplicationVersion, StoreError> {
        let record = sqlx::query_as::<_, ApplicationVersion>(
            r#"
            INSERT INTO application_version (
                application_id, version, valid_from,
                price_standard, price_priority, price_express, price_research
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(application_id)
        .bind(version)
        .bind(valid_from)
        .bind(prices.standard)
        .bind(prices.priority)
        .bind(prices.express)
        .bind(prices.research)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn add_panel(
        &self,
        customer_id: i32,
        name: &str,
        abbrev: &str,
        version: f64,
        date: Option<DateTime<Utc>>,
        genes: Option<i32>,
    ) -> Result<Panel, StoreError> {
        let panel = sqlx::query_as::<_, Panel>(
            r#"
            INSERT INTO panel (customer_id, name, abbrev, current_version, date, gene_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(customer_id)
        .bind(name)
        .bind(abbrev)
        .bind(version)
        .bind(date)
        .bind(genes)
        .fetch_one(&self.pool)
        .await?;

        Ok(panel)
    }

    pub async fn add_organism(
        &self,
        internal_id: &str,
        name: &str,
        reference_genome: Option<&str>,
        verified: bool,
    ) -> Result<Organism, StoreError> {
        let organism = sqlx::query_as::<_, Organism>(
            r#"
            INSERT INTO organism (internal_id, name, reference_genome, verified)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(internal_id)
        .bind(name)
        .bind(reference_genome)
        .bind(verified)
        .fetch_one(&self.pool)
        .await?;

        Ok(organism)
    }

    pub async fn add_flowcell(
        &self,
        name: &str,
        sequencer: &str,
        sequencer_type: &str,
        date: DateTime<Utc>,
    ) -> Result<Flowcell, StoreError> {
        let flowcell = sqlx::query_as::<_, Flowcell>(
            r#"
            INSERT INTO flowcell (name, sequencer_name, sequencer_type, sequenced_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(sequencer)
        .bind(sequencer_type)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(flowcell)
    }

    async fn generate_unique_sample_id(&self) -> Result<String, StoreError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let candidate = petname::sample_name();
            if self.sample(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            debug!("{} already used - trying another id", candidate);
        }
        Err(StoreError::InvalidInput("could not generate a unique sample id".to_string()))
    }

    async fn generate_unique_case_id(&self) -> Result<String, StoreError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let candidate = petname::case_name();
            if self.family(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            debug!("{} already used - trying another id", candidate);
        }
        Err(StoreError::InvalidInput("could not generate a unique case id".to_string()))
    }

    pub async fn add_sample(&self, new: &NewSample) -> Result<Sample, StoreError> {
        let internal_id = match &new.internal_id {
            Some(id) => id.clone(),
            None => self.generate_unique_sample_id().await?,
        };

        let sample = sqlx::query_as::<_, Sample>(
            r#"
            INSERT INTO sample (
                internal_id, name, customer_id, application_version_id, organism_id,
                sex, comment, control, downsampled_to, is_tumour, "order",
                priority, ticket_number, ordered_at, received_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(&internal_id)
        .bind(&new.name)
        .bind(new.customer_id)
        .bind(new.application_version_id)
        .bind(new.organism_id)
        .bind(new.sex.as_str())
        .bind(&new.comment)
        .bind(&new.control)
        .bind(new.downsampled_to)
        .bind(new.tumour)
        .bind(&new.order)
        .bind(new.effective_priority().as_db())
        .bind(new.ticket)
        .bind(new.ordered_at.unwrap_or_else(Utc::now))
        .bind(new.received_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(sample)
    }

    pub async fn add_case(&self, new: &NewCase) -> Result<Family, StoreError> {
        let internal_id = self.generate_unique_case_id().await?;

        let avatar_url = match &new.avatar_url {
            Some(url) if self.find_family_by_avatar_url(url).await?.is_none() => Some(url.clone()),
            Some(url) => {
                debug!("{} already used - leaving avatar empty", url);
                None
            }
            None => None,
        };

        let family = sqlx::query_as::<_, Family>(
            r#"
            INSERT INTO family (
                internal_id, name, customer_id, data_analysis, data_delivery,
                panels, cohorts, priority, avatar_url, synopsis
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&internal_id)
        .bind(&new.name)
        .bind(new.customer_id)
        .bind(new.data_analysis.as_str())
        .bind(new.data_delivery.as_str())
        .bind(&new.panels)
        .bind(&new.cohorts)
        .bind(new.priority.as_db())
        .bind(avatar_url)
        .bind(&new.synopsis)
        .fetch_one(&self.pool)
        .await?;

        Ok(family)
    }

    pub async fn relate_sample(
        &self,
        family_id: i32,
        sample_id: i32,
        status: PhenotypeStatus,
        mother_id: Option<i32>,
        father_id: Option<i32>,
    ) -> Result<FamilySample, StoreError> {
        let link = sqlx::query_as::<_, FamilySample>(
            r#"
            INSERT INTO family_sample (family_id, sample_id, status, mother_id, father_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(family_id)
        .bind(sample_id)
        .bind(status.as_str())
        .bind(mother_id)
        .bind(father_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(link)
    }

    pub async fn add_analysis(&self, new: &NewAnalysis) -> Result<Analysis, StoreError> {
        let analysis = sqlx::query_as::<_, Analysis>(
            r#"
            INSERT INTO analysis (
                family_id, pipeline, pipeline_version, started_at,
                completed_at, uploaded_at, is_primary
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new.family_id)
        .bind(new.pipeline.as_str())
        .bind(&new.version)
        .bind(new.started_at)
        .bind(new.completed_at)
        .bind(new.uploaded_at)
        .bind(new.primary)
        .fetch_one(&self.pool)
        .await?;

        Ok(analysis)
    }

    pub async fn add_pool(&self, new: &NewPool) -> Result<Pool, StoreError> {
        let pool = sqlx::query_as::<_, Pool>(
            r#"
            INSERT INTO pool (
                customer_id, application_version_id, name, "order", ordered_at,
                ticket_number, comment, received_at, capture_kit
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new.customer_id)
        .bind(new.application_version_id)
        .bind(&new.name)
        .bind(&new.order)
        .bind(new.ordered_at.unwrap_or_else(Utc::now))
        .bind(new.ticket)
        .bind(&new.comment)
        .bind(new.received_at)
        .bind(&new.capture_kit)
        .fetch_one(&self.pool)
        .await?;

        Ok(pool)
    }

    pub async fn add_delivery(
        &self,
        destination: &str,
        sample_id: Option<i32>,
        pool_id: Option<i32>,
        comment: Option<&str>,
    ) -> Result<Delivery, StoreError> {
        if sample_id.is_none() && pool_id.is_none() {
            return Err(StoreError::InvalidInput(
                "you have to provide a sample or a pool".to_string(),
            ));
        }

        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            INSERT INTO delivery (destination, sample_id, pool_id, comment)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(destination)
        .bind(sample_id)
        .bind(pool_id)
        .bind(comment)
        .fetch_one(&self.pool)
        .await?;

        Ok(delivery)
    }

    /// New invoice numbered after the highest existing one, with the given
    /// samples and pools attached
    pub async fn add_invoice(
        &self,
        customer_id: i32,
        sample_ids: &[i32],
        pool_ids: &[i32],
        comment: Option<&str>,
        discount: i32,
        record_type: Option<&str>,
    ) -> Result<Invoice, StoreError> {
        let mut tx = self.pool.begin().await?;

        let max_id: Option<i32> = sqlx::query_scalar("SELECT MAX(id) FROM invoice")
            .fetch_one(&mut *tx)
            .await?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoice (id, customer_id, comment, discount, record_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(next_invoice_id(max_id))
        .bind(customer_id)
        .bind(comment)
        .bind(discount)
        .bind(record_type)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE sample SET invoice_id = $1 WHERE id = ANY($2)")
            .bind(invoice.id)
            .bind(sample_ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE pool SET invoice_id = $1 WHERE id = ANY($2)")
            .bind(invoice.id)
            .bind(pool_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(invoice)
    }
}

pub(crate) fn next_invoice_id(max_id: Option<i32>) -> i32 {
    max_id.map_or(1, |id| id + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_priority_defaults() {
        let mut sample = NewSample::new("s1", Sex::Female, 1, 1);
        assert_eq!(sample.effective_priority(), Priority::Standard);

        sample.downsampled_to = Some(1_000_000);
        assert_eq!(sample.effective_priority(), Priority::Research);

        sample.priority = Some(Priority::Express);
        assert_eq!(sample.effective_priority(), Priority::Express);
    }

    #[test]
    fn test_next_invoice_id() {
        assert_eq!(next_invoice_id(None), 1);
        assert_eq!(next_invoice_id(Some(41)), 42);
    }

    #[test]
    fn test_new_case_defaults() {
        let case = NewCase::new(3, "family1", Pipeline::MipDna, DataDelivery::Scout);
        assert_eq!(case.priority, Priority::Standard);
        assert!(case.panels.is_empty());
        assert!(case.avatar_url.is_none());
    }
}

// ==============================================================================
// find.rs - Status Database Lookups
// ==============================================================================
// Description: Single-record and filtered queries over the status database
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{like_pattern, Store, StoreError};
use crate::constants::CaseAction;
use crate::models::{
    Analysis, Application, ApplicationVersion, CaseLink, Customer, CustomerGroup, Delivery, Family,
    FamilySample, Flowcell, Invoice, Panel, Pool, Sample, User,
};

const FAMILIES_IN_CUSTOMER_GROUP: &str = r#"
    SELECT f.* FROM family f
    JOIN customer c ON c.id = f.customer_id
    WHERE c.customer_group_id = (SELECT customer_group_id FROM customer WHERE id = $1)
      AND ($2::TEXT IS NULL OR f.name LIKE $2 OR f.internal_id LIKE $2)
      AND ($3::TEXT IS NULL OR f.action = $3)
    ORDER BY f.created_at DESC
"#;

impl Store {
    pub async fn customer(&self, internal_id: &str) -> Result<Option<Customer>, StoreError> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customer WHERE internal_id = $1")
            .bind(internal_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    pub async fn customer_by_id(&self, id: i32) -> Result<Option<Customer>, StoreError> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customer WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    pub async fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        let customers = sqlx::query_as::<_, Customer>("SELECT * FROM customer ORDER BY internal_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(customers)
    }

    pub async fn customer_group(&self, internal_id: &str) -> Result<Option<CustomerGroup>, StoreError> {
        let group = sqlx::query_as::<_, CustomerGroup>("SELECT * FROM customer_group WHERE internal_id = $1")
            .bind(internal_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(group)
    }

    pub async fn user(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM "user" WHERE email = $1"#)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Customers a user may act on behalf of
    pub async fn user_customers(&self, user_id: i32) -> Result<Vec<Customer>, StoreError> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT c.* FROM customer c
            JOIN customer_user cu ON cu.customer_id = c.id
            WHERE cu.user_id = $1
            ORDER BY c.internal_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(customers)
    }

    pub async fn family(&self, internal_id: &str) -> Result<Option<Family>, StoreError> {
        let family = sqlx::query_as::<_, Family>("SELECT * FROM family WHERE internal_id = $1")
            .bind(internal_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(family)
    }

    pub async fn family_by_id(&self, id: i32) -> Result<Option<Family>, StoreError> {
        let family = sqlx::query_as::<_, Family>("SELECT * FROM family WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(family)
    }

    pub async fn find_family_by_avatar_url(&self, avatar_url: &str) -> Result<Option<Family>, StoreError> {
        let family = sqlx::query_as::<_, Family>("SELECT * FROM family WHERE avatar_url = $1")
            .bind(avatar_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(family)
    }

    /// Cases, newest first, optionally limited to one customer, a name or id
    /// fragment and an action
    pub async fn families(
        &self,
        customer_id: Option<i32>,
        query: Option<&str>,
        action: Option<CaseAction>,
    ) -> Result<Vec<Family>, StoreError> {
        let families = sqlx::query_as::<_, Family>(
            r#"
            SELECT * FROM family
            WHERE ($1::INTEGER IS NULL OR customer_id = $1)
              AND ($2::TEXT IS NULL OR name LIKE $2 OR internal_id LIKE $2)
              AND ($3::TEXT IS NULL OR action = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .bind(query.map(like_pattern))
        .bind(action.map(|a| a.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(families)
    }

    /// Like `families` but across every customer in the customer's group
    pub async fn families_in_customer_group(
        &self,
        customer_id: i32,
        query: Option<&str>,
        action: Option<CaseAction>,
    ) -> Result<Vec<Family>, StoreError> {
        let families = sqlx::query_as::<_, Family>(FAMILIES_IN_CUSTOMER_GROUP)
            .bind(customer_id)
            .bind(query.map(like_pattern))
            .bind(action.map(|a| a.as_str()))
            .fetch_all(&self.pool)
            .await?;
        Ok(families)
    }

    pub async fn find_family(&self, customer_id: i32, name: &str) -> Result<Option<Family>, StoreError> {
        let family = sqlx::query_as::<_, Family>("SELECT * FROM family WHERE customer_id = $1 AND name = $2")
            .bind(customer_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(family)
    }

    pub async fn sample(&self, internal_id: &str) -> Result<Option<Sample>, StoreError> {
        let sample = sqlx::query_as::<_, Sample>("SELECT * FROM sample WHERE internal_id = $1")
            .bind(internal_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sample)
    }

    pub async fn sample_by_id(&self, id: i32) -> Result<Option<Sample>, StoreError> {
        let sample = sqlx::query_as::<_, Sample>("SELECT * FROM sample WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sample)
    }

    pub async fn samples(&self, customer_id: Option<i32>, query: Option<&str>) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT * FROM sample
            WHERE ($1::INTEGER IS NULL OR customer_id = $1)
              AND ($2::TEXT IS NULL OR name LIKE $2 OR internal_id LIKE $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .bind(query.map(like_pattern))
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }

    pub async fn samples_in_customer_group(
        &self,
        customer_id: i32,
        query: Option<&str>,
    ) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT s.* FROM sample s
            JOIN customer c ON c.id = s.customer_id
            WHERE c.customer_group_id = (SELECT customer_group_id FROM customer WHERE id = $1)
              AND ($2::TEXT IS NULL OR s.name LIKE $2 OR s.internal_id LIKE $2)
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(customer_id)
        .bind(query.map(like_pattern))
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }

    pub async fn find_samples(&self, customer_id: i32, name: &str) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>("SELECT * FROM sample WHERE customer_id = $1 AND name = $2")
            .bind(customer_id)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
        Ok(samples)
    }

    pub async fn application(&self, tag: &str) -> Result<Option<Application>, StoreError> {
        let application = sqlx::query_as::<_, Application>("SELECT * FROM application WHERE tag = $1")
            .bind(tag)
            .fetch_optional(&self.pool)
            .await?;
        Ok(application)
    }

    pub async fn applications(
        &self,
        category: Option<&str>,
        archived: Option<bool>,
    ) -> Result<Vec<Application>, StoreError> {
        let applications = sqlx::query_as::<_, Application>(
            r#"
            SELECT * FROM application
            WHERE ($1::TEXT IS NULL OR prep_category = $1)
              AND ($2::BOOLEAN IS NULL OR is_archived = $2)
            ORDER BY prep_category, tag
            "#,
        )
        .bind(category)
        .bind(archived)
        .fetch_all(&self.pool)
        .await?;
        Ok(applications)
    }

    pub async fn application_version(
        &self,
        application_id: i32,
        version: i32,
    ) -> Result<Option<ApplicationVersion>, StoreError> {
        let record = sqlx::query_as::<_, ApplicationVersion>(
            "SELECT * FROM application_version WHERE application_id = $1 AND version = $2",
        )
        .bind(application_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Highest version of an application, `None` for unknown tags
    pub async fn latest_version(&self, tag: &str) -> Result<Option<ApplicationVersion>, StoreError> {
        let record = sqlx::query_as::<_, ApplicationVersion>(
            r#"
            SELECT v.* FROM application_version v
            JOIN application a ON a.id = v.application_id
            WHERE a.tag = $1
            ORDER BY v.version DESC
            LIMIT 1
            "#,
        )
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn application_for_version(&self, version_id: i32) -> Result<Option<Application>, StoreError> {
        let application = sqlx::query_as::<_, Application>(
            r#"
            SELECT a.* FROM application a
            JOIN application_version v ON v.application_id = a.id
            WHERE v.id = $1
            "#,
        )
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(application)
    }

    pub async fn panel(&self, abbrev: &str) -> Result<Option<Panel>, StoreError> {
        let panel = sqlx::query_as::<_, Panel>("SELECT * FROM panel WHERE abbrev = $1")
            .bind(abbrev)
            .fetch_optional(&self.pool)
            .await?;
        Ok(panel)
    }

    /// Analyses newest first. With `before`, only each family's latest
    /// analysis started strictly before that time.
    pub async fn analyses(
        &self,
        family_id: Option<i32>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Analysis>, StoreError> {
        let analyses = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT * FROM analysis
            WHERE ($1::INTEGER IS NULL OR family_id = $1)
            ORDER BY started_at DESC NULLS LAST
            "#,
        )
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(match before {
            Some(before) => analyses_before(analyses, before),
            None => analyses,
        })
    }

    pub async fn analysis(&self, family_id: i32, started_at: DateTime<Utc>) -> Result<Option<Analysis>, StoreError> {
        let analysis = sqlx::query_as::<_, Analysis>(
            "SELECT * FROM analysis WHERE family_id = $1 AND started_at = $2",
        )
        .bind(family_id)
        .bind(started_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(analysis)
    }

    pub async fn analysis_by_id(&self, id: i32) -> Result<Option<Analysis>, StoreError> {
        let analysis = sqlx::query_as::<_, Analysis>("SELECT * FROM analysis WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(analysis)
    }

    pub async fn latest_analysis(&self, family_id: i32) -> Result<Option<Analysis>, StoreError> {
        let analysis = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT * FROM analysis
            WHERE family_id = $1
            ORDER BY started_at DESC NULLS LAST, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(analysis)
    }

    /// Flowcells newest first, optionally by status, by a case's samples or
    /// by a name fragment
    pub async fn flowcells(
        &self,
        status: Option<&str>,
        family_id: Option<i32>,
        query: Option<&str>,
    ) -> Result<Vec<Flowcell>, StoreError> {
        let flowcells = sqlx::query_as::<_, Flowcell>(
            r#"
            SELECT * FROM flowcell f
            WHERE ($1::TEXT IS NULL OR f.status = $1)
              AND ($2::TEXT IS NULL OR f.name LIKE $2)
              AND ($3::INTEGER IS NULL OR EXISTS (
                  SELECT 1 FROM flowcell_sample fs
                  JOIN family_sample link ON link.sample_id = fs.sample_id
                  WHERE fs.flowcell_id = f.id AND link.family_id = $3
              ))
            ORDER BY f.sequenced_at DESC
            "#,
        )
        .bind(status)
        .bind(query.map(like_pattern))
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(flowcells)
    }

    pub async fn flowcell(&self, name: &str) -> Result<Option<Flowcell>, StoreError> {
        let flowcell = sqlx::query_as::<_, Flowcell>("SELECT * FROM flowcell WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(flowcell)
    }

    pub async fn link(&self, case_id: &str, sample_id: &str) -> Result<Option<FamilySample>, StoreError> {
        let link = sqlx::query_as::<_, FamilySample>(
            r#"
            SELECT fs.* FROM family_sample fs
            JOIN family f ON f.id = fs.family_id
            JOIN sample s ON s.id = fs.sample_id
            WHERE f.internal_id = $1 AND s.internal_id = $2
            "#,
        )
        .bind(case_id)
        .bind(sample_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(link)
    }

    /// Every sample linked to a case, parents resolved
    pub async fn family_samples(&self, case_id: &str) -> Result<Vec<CaseLink>, StoreError> {
        let links = sqlx::query_as::<_, FamilySample>(
            r#"
            SELECT fs.* FROM family_sample fs
            JOIN family f ON f.id = fs.family_id
            WHERE f.internal_id = $1
            ORDER BY fs.id
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT s.* FROM sample s
            JOIN family_sample fs ON s.id IN (fs.sample_id, fs.mother_id, fs.father_id)
            JOIN family f ON f.id = fs.family_id
            WHERE f.internal_id = $1
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        let by_id: HashMap<i32, Sample> = samples.into_iter().map(|s| (s.id, s)).collect();

        links
            .into_iter()
            .map(|link| {
                let sample = by_id
                    .get(&link.sample_id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found("sample", link.sample_id))?;
                let mother = link.mother_id.and_then(|id| by_id.get(&id).cloned());
                let father = link.father_id.and_then(|id| by_id.get(&id).cloned());
                Ok(CaseLink { link, sample, mother, father })
            })
            .collect()
    }

    /// Samples linked to a case, without parents
    pub async fn case_samples(&self, family_id: i32) -> Result<Vec<Sample>, StoreError> {
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT s.* FROM sample s
            JOIN family_sample fs ON fs.sample_id = s.id
            WHERE fs.family_id = $1
            ORDER BY s.internal_id
            "#,
        )
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }

    pub async fn pools(&self, customer_id: Option<i32>) -> Result<Vec<Pool>, StoreError> {
        let pools = sqlx::query_as::<_, Pool>(
            r#"
            SELECT * FROM pool
            WHERE ($1::INTEGER IS NULL OR customer_id = $1)
            ORDER BY ordered_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(pools)
    }

    pub async fn pool_by_id(&self, id: i32) -> Result<Option<Pool>, StoreError> {
        let pool = sqlx::query_as::<_, Pool>("SELECT * FROM pool WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pool)
    }

    pub async fn deliveries(&self) -> Result<Vec<Delivery>, StoreError> {
        let deliveries = sqlx::query_as::<_, Delivery>("SELECT * FROM delivery ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(deliveries)
    }

    /// Invoices newest first; `Some(true)` keeps invoiced ones, `Some(false)`
    /// the ones still open
    pub async fn invoices(&self, invoiced: Option<bool>) -> Result<Vec<Invoice>, StoreError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoice
            WHERE ($1::BOOLEAN IS NULL OR (invoiced_at IS NOT NULL) = $1)
            ORDER BY id DESC
            "#,
        )
        .bind(invoiced)
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    pub async fn invoice(&self, id: i32) -> Result<Option<Invoice>, StoreError> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoice WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    pub async fn new_invoice_id(&self) -> Result<i32, StoreError> {
        let max_id: Option<i32> = sqlx::query_scalar("SELECT MAX(id) FROM invoice")
            .fetch_one(&self.pool)
            .await?;
        Ok(super::add::next_invoice_id(max_id))
    }
}

/// Each family's latest analysis started strictly before `before`
pub(crate) fn analyses_before(analyses: Vec<Analysis>, before: DateTime<Utc>) -> Vec<Analysis> {
    let mut latest: HashMap<i32, Analysis> = HashMap::new();

    for analysis in analyses {
        let Some(started) = analysis.started_at else {
            continue;
        };
        if started >= before {
            continue;
        }
        let newer = latest
            .get(&analysis.family_id)
            .and_then(|current| current.started_at)
            .map_or(true, |current| started > current);
        if newer {
            latest.insert(analysis.family_id, analysis);
        }
    }

    let mut out: Vec<Analysis> = latest.into_values().collect();
    out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn analysis(id: i32, family_id: i32, started_at: Option<DateTime<Utc>>) -> Analysis {
        Analysis {
            id,
            family_id,
            pipeline: "mip".to_string(),
            pipeline_version: None,
            started_at,
            completed_at: None,
            upload_started_at: None,
            uploaded_at: None,
            delivered_at: None,
            delivery_report_created_at: None,
            is_primary: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_analyses_before_keeps_latest_per_family() {
        let now = Utc::now();
        let analyses = vec![
            analysis(1, 1, Some(now - Duration::days(10))),
            analysis(2, 1, Some(now - Duration::days(5))),
            analysis(3, 1, Some(now + Duration::days(1))),
            analysis(4, 2, Some(now - Duration::days(20))),
            analysis(5, 2, None),
        ];

        let found = analyses_before(analyses, now);
        let ids: Vec<i32> = found.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[test]
    fn test_analyses_before_is_strict() {
        let now = Utc::now();
        let found = analyses_before(vec![analysis(1, 1, Some(now))], now);
        assert!(found.is_empty());
    }

    #[test]
    fn test_group_cases_filter_on_action() {
        assert!(FAMILIES_IN_CUSTOMER_GROUP.contains("$3::TEXT IS NULL OR f.action = $3"));
        assert!(FAMILIES_IN_CUSTOMER_GROUP.contains("customer_group_id"));
    }
}

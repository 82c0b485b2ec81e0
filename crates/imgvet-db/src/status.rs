use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::str::FromStr;
use uuid::Uuid;

use imgvet_core::models::{Finding, PipelineStatus, StatusLinks, StatusRecord};
use imgvet_core::{AppError, StatusStore};

/// Postgres-backed status record store.
#[derive(Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    corr_id: Uuid,
    status: String,
    last_update: DateTime<Utc>,
    findings: Option<serde_json::Value>,
    links: Option<serde_json::Value>,
}

impl StatusRow {
    fn into_record(self) -> Result<StatusRecord, AppError> {
        let status = PipelineStatus::from_str(&self.status)?;
        let findings: Option<Vec<Finding>> = self
            .findings
            .map(serde_json::from_value)
            .transpose()?;
        let links: Option<StatusLinks> = self.links.map(serde_json::from_value).transpose()?;
        Ok(StatusRecord {
            corr_id: self.corr_id,
            status,
            last_update: self.last_update,
            findings,
            links,
        })
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    #[tracing::instrument(skip(self))]
    async fn create(&self, corr_id: Uuid) -> Result<StatusRecord, AppError> {
        let row: StatusRow = sqlx::query_as::<Postgres, StatusRow>(
            r#"
            INSERT INTO status_records (corr_id, status, last_update)
            VALUES ($1, $2, NOW())
            RETURNING corr_id, status, last_update, findings, links
            "#,
        )
        .bind(corr_id)
        .bind(PipelineStatus::Received.to_string())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(corr_id = %corr_id, "Status record created");
        row.into_record()
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, corr_id: Uuid) -> Result<Option<StatusRecord>, AppError> {
        let row: Option<StatusRow> = sqlx::query_as::<Postgres, StatusRow>(
            r#"
            SELECT corr_id, status, last_update, findings, links
            FROM status_records
            WHERE corr_id = $1
            "#,
        )
        .bind(corr_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StatusRow::into_record).transpose()
    }

    #[tracing::instrument(skip(self, findings, links))]
    async fn transition(
        &self,
        corr_id: Uuid,
        next: PipelineStatus,
        findings: Option<Vec<Finding>>,
        links: Option<StatusLinks>,
    ) -> Result<StatusRecord, AppError> {
        // Row lock so a concurrent redelivery cannot interleave its
        // read-check-write with ours.
        let mut tx = self.pool.begin().await?;

        let current: Option<StatusRow> = sqlx::query_as::<Postgres, StatusRow>(
            r#"
            SELECT corr_id, status, last_update, findings, links
            FROM status_records
            WHERE corr_id = $1
            FOR UPDATE
            "#,
        )
        .bind(corr_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = current
            .ok_or_else(|| AppError::NotFound(format!("No status record for {}", corr_id)))?
            .into_record()?;

        if !current.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let findings_json = findings
            .map(|f| serde_json::to_value(f))
            .transpose()?;
        let links_json = links.map(|l| serde_json::to_value(l)).transpose()?;

        let row: StatusRow = sqlx::query_as::<Postgres, StatusRow>(
            r#"
            UPDATE status_records
            SET status = $2,
                last_update = NOW(),
                findings = COALESCE($3, findings),
                links = COALESCE($4, links)
            WHERE corr_id = $1
            RETURNING corr_id, status, last_update, findings, links
            "#,
        )
        .bind(corr_id)
        .bind(next.to_string())
        .bind(findings_json)
        .bind(links_json)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            corr_id = %corr_id,
            from = %current.status,
            to = %next,
            "Status transition"
        );
        row.into_record()
    }
}

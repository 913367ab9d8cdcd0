use crate::error::{AppError, Result};
use crate::models::{
    ExecutionSpec, ExecutionType, Migration, MigrationDefinition, MigrationReport,
    MigrationStatus,
};
use crate::repository::DbPool;
use chrono::{DateTime, Utc};

#[derive(Debug, sqlx::FromRow)]
struct MigrationRow {
    id: String,
    plan_id: String,
    server_id: String,
    process_instance_ids: Option<String>,
    execution_type: ExecutionType,
    scheduled_start_time: Option<DateTime<Utc>>,
    callback_url: Option<String>,
    requester: Option<String>,
    status: MigrationStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: String,
    migration_id: String,
    process_instance_id: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    successful: bool,
    logs: String,
}

impl TryFrom<MigrationRow> for Migration {
    type Error = AppError;

    fn try_from(row: MigrationRow) -> Result<Self> {
        let process_instance_ids = row
            .process_instance_ids
            .map(|raw| {
                serde_json::from_str::<Vec<i64>>(&raw).map_err(|e| {
                    AppError::InvalidData(format!(
                        "process instance ids of migration {}: {}",
                        row.id, e
                    ))
                })
            })
            .transpose()?;

        Ok(Migration {
            id: row.id,
            definition: MigrationDefinition {
                plan_id: row.plan_id,
                server_id: row.server_id,
                process_instance_ids,
                execution: ExecutionSpec {
                    execution_type: row.execution_type,
                    scheduled_start_time: row.scheduled_start_time,
                    callback_url: row.callback_url,
                },
                requester: row.requester,
            },
            status: row.status,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            cancelled_at: row.cancelled_at,
            error_message: row.error_message,
        })
    }
}

impl TryFrom<ReportRow> for MigrationReport {
    type Error = AppError;

    fn try_from(row: ReportRow) -> Result<Self> {
        let logs = serde_json::from_str(&row.logs).map_err(|e| {
            AppError::InvalidData(format!("logs of migration report {}: {}", row.id, e))
        })?;
        Ok(MigrationReport {
            id: row.id,
            migration_id: row.migration_id,
            process_instance_id: row.process_instance_id,
            start_date: row.start_date,
            end_date: row.end_date,
            successful: row.successful,
            logs,
        })
    }
}

#[derive(Clone)]
pub struct MigrationRepository {
    pool: DbPool,
}

impl MigrationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, definition: &MigrationDefinition) -> Result<Migration> {
        let migration = Migration {
            id: uuid::Uuid::new_v4().to_string(),
            definition: definition.clone(),
            status: MigrationStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            cancelled_at: None,
            error_message: None,
        };

        let instance_ids = definition
            .process_instance_ids
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::InvalidMigration(format!("process instance ids: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO migrations (
                id, plan_id, server_id, process_instance_ids, execution_type,
                scheduled_start_time, callback_url, requester, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&migration.id)
        .bind(&definition.plan_id)
        .bind(&definition.server_id)
        .bind(instance_ids)
        .bind(definition.execution.execution_type as i32)
        .bind(definition.execution.scheduled_start_time)
        .bind(&definition.execution.callback_url)
        .bind(&definition.requester)
        .bind(migration.status as i32)
        .bind(migration.created_at)
        .execute(&self.pool)
        .await?;

        Ok(migration)
    }

    pub async fn get(&self, id: &str) -> Result<Migration> {
        let row = sqlx::query_as::<_, MigrationRow>("SELECT * FROM migrations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::MigrationNotFound(id.to_string()))?;

        row.try_into()
    }

    pub async fn list_all(&self) -> Result<Vec<Migration>> {
        let rows = sqlx::query_as::<_, MigrationRow>(
            "SELECT * FROM migrations ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Migration::try_from).collect()
    }

    pub async fn list_by_status(&self, status: MigrationStatus) -> Result<Vec<Migration>> {
        let rows = sqlx::query_as::<_, MigrationRow>(
            "SELECT * FROM migrations WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(status as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Migration::try_from).collect()
    }

    /// `Created -> Scheduled`. Returns false when the migration was not in `Created`.
    pub async fn mark_scheduled(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE migrations SET status = ? WHERE id = ? AND status = ?")
            .bind(MigrationStatus::Scheduled as i32)
            .bind(id)
            .bind(MigrationStatus::Created as i32)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Claims a pending migration for execution. Only one caller can win.
    pub async fn try_start(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE migrations
            SET status = ?, started_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(MigrationStatus::Started as i32)
        .bind(Utc::now())
        .bind(id)
        .bind(MigrationStatus::Created as i32)
        .bind(MigrationStatus::Scheduled as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `Started -> Completed | Failed`, stamping `finished_at`.
    pub async fn finish(
        &self,
        id: &str,
        status: MigrationStatus,
        error_message: Option<String>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE migrations
            SET status = ?, finished_at = ?, error_message = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status as i32)
        .bind(Utc::now())
        .bind(error_message)
        .bind(id)
        .bind(MigrationStatus::Started as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn try_cancel(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE migrations
            SET status = ?, cancelled_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(MigrationStatus::Cancelled as i32)
        .bind(Utc::now())
        .bind(id)
        .bind(MigrationStatus::Created as i32)
        .bind(MigrationStatus::Scheduled as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn update_scheduled_start(
        &self,
        id: &str,
        scheduled_start_time: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE migrations SET scheduled_start_time = ? WHERE id = ? AND status = ?",
        )
        .bind(scheduled_start_time)
        .bind(id)
        .bind(MigrationStatus::Scheduled as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn add_report(&self, report: &MigrationReport) -> Result<()> {
        let logs = serde_json::to_string(&report.logs)
            .map_err(|e| AppError::InvalidData(format!("report logs: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO migration_reports (
                id, migration_id, process_instance_id, start_date, end_date, successful, logs
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(&report.migration_id)
        .bind(report.process_instance_id)
        .bind(report.start_date)
        .bind(report.end_date)
        .bind(report.successful)
        .bind(logs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_reports(&self, migration_id: &str) -> Result<Vec<MigrationReport>> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT * FROM migration_reports WHERE migration_id = ? ORDER BY rowid ASC",
        )
        .bind(migration_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MigrationReport::try_from).collect()
    }

    pub async fn get_report(&self, id: &str) -> Result<MigrationReport> {
        let row = sqlx::query_as::<_, ReportRow>("SELECT * FROM migration_reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::ReportNotFound(id.to_string()))?;

        row.try_into()
    }
}

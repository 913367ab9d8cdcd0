use crate::models::{
    ExecutionSpec, ExecutionType, Migration, MigrationDefinition, MigrationReport,
    MigrationStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SubmitMigrationRequest {
    pub plan_id: String,
    pub server_id: String,
    pub process_instance_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub execution: ExecutionSpec,
    pub requester: Option<String>,
}

impl From<SubmitMigrationRequest> for MigrationDefinition {
    fn from(req: SubmitMigrationRequest) -> Self {
        Self {
            plan_id: req.plan_id,
            server_id: req.server_id,
            process_instance_ids: req.process_instance_ids,
            execution: req.execution,
            requester: req.requester,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RescheduleMigrationRequest {
    pub scheduled_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MigrationResponse {
    pub id: String,
    pub plan_id: String,
    pub server_id: String,
    pub process_instance_ids: Option<Vec<i64>>,
    pub execution_type: ExecutionType,
    pub scheduled_start_time: Option<String>,
    pub callback_url: Option<String>,
    pub requester: Option<String>,
    pub status: MigrationStatus,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub error_message: Option<String>,
}

impl From<Migration> for MigrationResponse {
    fn from(migration: Migration) -> Self {
        let definition = migration.definition;
        Self {
            id: migration.id,
            plan_id: definition.plan_id,
            server_id: definition.server_id,
            process_instance_ids: definition.process_instance_ids,
            execution_type: definition.execution.execution_type,
            scheduled_start_time: definition
                .execution
                .scheduled_start_time
                .map(|t| t.to_rfc3339()),
            callback_url: definition.execution.callback_url,
            requester: definition.requester,
            status: migration.status,
            created_at: migration.created_at.to_rfc3339(),
            started_at: migration.started_at.map(|t| t.to_rfc3339()),
            finished_at: migration.finished_at.map(|t| t.to_rfc3339()),
            cancelled_at: migration.cancelled_at.map(|t| t.to_rfc3339()),
            error_message: migration.error_message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MigrationsListResponse {
    pub data: Vec<MigrationResponse>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub id: String,
    pub migration_id: String,
    pub process_instance_id: i64,
    pub start_date: String,
    pub end_date: String,
    pub successful: bool,
    pub logs: Vec<String>,
}

impl From<MigrationReport> for ReportResponse {
    fn from(report: MigrationReport) -> Self {
        Self {
            id: report.id,
            migration_id: report.migration_id,
            process_instance_id: report.process_instance_id,
            start_date: report.start_date.to_rfc3339(),
            end_date: report.end_date.to_rfc3339(),
            successful: report.successful,
            logs: report.logs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportsListResponse {
    pub data: Vec<ReportResponse>,
}

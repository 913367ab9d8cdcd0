use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Migration {
    pub id: String,
    pub definition: MigrationDefinition,
    pub status: MigrationStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationDefinition {
    pub plan_id: String,
    pub server_id: String,
    /// Explicit targets. `None` or empty means every active instance of
    /// the plan's source process is discovered when the migration runs.
    #[serde(default)]
    pub process_instance_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub execution: ExecutionSpec,
    pub requester: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSpec {
    #[serde(rename = "type", default)]
    pub execution_type: ExecutionType,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum ExecutionType {
    #[default]
    Sync = 0,
    Async = 1,
}

/// Lifecycle: `Created -> Scheduled -> Started -> {Completed | Failed | Cancelled}`.
/// Sync migrations skip `Scheduled`; only `Created` and `Scheduled` may be cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum MigrationStatus {
    Created = 0,
    Scheduled = 1,
    Started = 2,
    Completed = 3,
    Failed = 4,
    Cancelled = 5,
}

impl MigrationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Pending statuses are the ones a run may start from and a cancel may stop.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Created | Self::Scheduled)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CREATED" => Some(Self::Created),
            "SCHEDULED" => Some(Self::Scheduled),
            "STARTED" => Some(Self::Started),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Scheduled => "SCHEDULED",
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

impl MigrationDefinition {
    pub fn is_async(&self) -> bool {
        self.execution.execution_type == ExecutionType::Async
    }

    pub fn explicit_instances(&self) -> Option<&[i64]> {
        self.process_instance_ids
            .as_deref()
            .filter(|ids| !ids.is_empty())
    }
}

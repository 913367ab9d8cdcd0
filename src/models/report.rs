use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of migrating a single process instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationReport {
    pub id: String,
    pub migration_id: String,
    pub process_instance_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub successful: bool,
    pub logs: Vec<String>,
}

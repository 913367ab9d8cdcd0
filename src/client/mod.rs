//! Outbound calls to remote process servers.
//!
//! Everything the migration core needs from a server goes through
//! [`ProcessServerClient`]. [`ClientFactory`] opens one per configured
//! server; the registry keeps it once the server has answered.

pub mod kie;
#[cfg(test)]
pub mod mock;

use crate::error::Result;
use crate::models::{ServerAuth, ServerConfig, ServerIdentity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub use kie::KieClientFactory;

/// Status code of an active process instance.
pub const ACTIVE_STATUS: i32 = 1;

/// Items requested per page when walking a paged server listing.
pub const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceFilter {
    pub statuses: Vec<i32>,
}

impl Default for InstanceFilter {
    fn default() -> Self {
        Self {
            statuses: vec![ACTIVE_STATUS],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInstanceSummary {
    pub id: i64,
    pub process_id: String,
    pub process_name: Option<String>,
    pub state: i32,
    pub initiator: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct MigrateInstance<'a> {
    pub source_container_id: &'a str,
    pub instance_id: i64,
    pub target_container_id: &'a str,
    pub target_process_id: &'a str,
    pub node_mapping: &'a HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMigration {
    pub successful: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub logs: Vec<String>,
}

#[async_trait]
pub trait ProcessServerClient: Send + Sync {
    async fn identify(&self) -> Result<ServerIdentity>;

    async fn list_containers(&self) -> Result<Vec<String>>;

    async fn find_process_definition(&self, container_id: &str, process_id: &str)
    -> Result<bool>;

    /// One page of the process definition ids deployed in a container.
    async fn find_process_definitions(
        &self,
        container_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<String>>;

    /// One raw page of instances in a container. Callers page until a
    /// page comes back shorter than `page_size`.
    async fn find_instances(
        &self,
        container_id: &str,
        filter: &InstanceFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ProcessInstanceSummary>>;

    async fn migrate_instance(&self, request: MigrateInstance<'_>) -> Result<InstanceMigration>;
}

#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        server: &ServerConfig,
        auth: &ServerAuth,
    ) -> Result<Arc<dyn ProcessServerClient>>;
}

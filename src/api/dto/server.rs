use crate::client::{PAGE_SIZE, ProcessInstanceSummary};
use crate::models::ServerIdentity;
use crate::services::server_registry::ServerConnection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Serialize)]
pub struct ServerResponse {
    pub id: String,
    pub name: String,
    pub host: String,
    pub connected: bool,
    /// What the server reported about itself on connect.
    pub remote: Option<ServerIdentity>,
}

impl From<&ServerConnection> for ServerResponse {
    fn from(connection: &ServerConnection) -> Self {
        let config = connection.config();
        Self {
            id: config.id.clone(),
            name: config.display_name().to_string(),
            host: config.host.clone(),
            connected: connection.is_connected(),
            remote: connection.identity().cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServersListResponse {
    pub data: Vec<ServerResponse>,
}

#[derive(Debug, Serialize)]
pub struct ContainersResponse {
    pub server_id: String,
    pub containers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DefinitionsResponse {
    pub server_id: String,
    /// Process definition ids keyed by container id.
    pub definitions: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RunningInstancesQuery {
    pub container_id: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    PAGE_SIZE
}

#[derive(Debug, Serialize)]
pub struct RunningInstanceResponse {
    /// Position within the page, starting at 1.
    pub index: usize,
    pub id: i64,
    pub process_id: String,
    pub process_name: Option<String>,
    pub state: i32,
    pub initiator: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
}

impl RunningInstanceResponse {
    pub fn new(index: usize, instance: ProcessInstanceSummary) -> Self {
        Self {
            index,
            id: instance.id,
            process_id: instance.process_id,
            process_name: instance.process_name,
            state: instance.state,
            initiator: instance.initiator,
            start_date: instance.start_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunningInstancesResponse {
    pub server_id: String,
    pub container_id: String,
    pub page: u32,
    pub page_size: u32,
    pub data: Vec<RunningInstanceResponse>,
}

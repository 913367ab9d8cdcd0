//! In-memory stand-ins for remote process servers used by unit tests.

use super::{
    ClientFactory, InstanceFilter, InstanceMigration, MigrateInstance, ProcessInstanceSummary,
    ProcessServerClient,
};
use crate::error::{AppError, Result};
use crate::models::{ServerAuth, ServerConfig, ServerIdentity};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockServerClient {
    identity: Option<ServerIdentity>,
    containers: Vec<String>,
    definitions: HashSet<(String, String)>,
    instances: Vec<ProcessInstanceSummary>,
    unsuccessful: HashSet<i64>,
    erroring: HashSet<i64>,
    migrated: Mutex<Vec<i64>>,
    mappings_seen: Mutex<Vec<HashMap<String, String>>>,
    page_requests: AtomicUsize,
    definition_page_requests: AtomicUsize,
}

impl MockServerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, server_id: &str, name: &str) -> Self {
        self.identity = Some(ServerIdentity {
            server_id: server_id.to_string(),
            name: name.to_string(),
            version: Some("7.74.1.Final".to_string()),
        });
        self
    }

    pub fn with_definition(mut self, container_id: &str, process_id: &str) -> Self {
        if !self.containers.iter().any(|c| c == container_id) {
            self.containers.push(container_id.to_string());
        }
        self.definitions
            .insert((container_id.to_string(), process_id.to_string()));
        self
    }

    pub fn with_instances(mut self, process_id: &str, ids: impl IntoIterator<Item = i64>) -> Self {
        self.instances.extend(ids.into_iter().map(|id| ProcessInstanceSummary {
            id,
            process_id: process_id.to_string(),
            process_name: Some(process_id.to_string()),
            state: super::ACTIVE_STATUS,
            initiator: Some("admin".to_string()),
            start_date: Some(Utc::now()),
        }));
        self
    }

    /// The server answers for this instance but reports the migration as unsuccessful.
    pub fn unsuccessful_instance(mut self, id: i64) -> Self {
        self.unsuccessful.insert(id);
        self
    }

    /// The call for this instance fails outright.
    pub fn erroring_instance(mut self, id: i64) -> Self {
        self.erroring.insert(id);
        self
    }

    pub fn migrated(&self) -> Vec<i64> {
        self.migrated.lock().unwrap().clone()
    }

    pub fn mappings_seen(&self) -> Vec<HashMap<String, String>> {
        self.mappings_seen.lock().unwrap().clone()
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    pub fn definition_page_requests(&self) -> usize {
        self.definition_page_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessServerClient for MockServerClient {
    async fn identify(&self) -> Result<ServerIdentity> {
        self.identity
            .clone()
            .ok_or_else(|| AppError::Remote("server info unavailable".to_string()))
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        Ok(self.containers.clone())
    }

    async fn find_process_definition(
        &self,
        container_id: &str,
        process_id: &str,
    ) -> Result<bool> {
        Ok(self
            .definitions
            .contains(&(container_id.to_string(), process_id.to_string())))
    }

    async fn find_process_definitions(
        &self,
        container_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<String>> {
        self.definition_page_requests.fetch_add(1, Ordering::SeqCst);
        let mut ids: Vec<&String> = self
            .definitions
            .iter()
            .filter(|(container, _)| container == container_id)
            .map(|(_, process_id)| process_id)
            .collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .skip((page * page_size) as usize)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn find_instances(
        &self,
        container_id: &str,
        _filter: &InstanceFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ProcessInstanceSummary>> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        if !self.containers.iter().any(|c| c == container_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .instances
            .iter()
            .skip((page * page_size) as usize)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn migrate_instance(&self, request: MigrateInstance<'_>) -> Result<InstanceMigration> {
        self.migrated.lock().unwrap().push(request.instance_id);
        self.mappings_seen
            .lock()
            .unwrap()
            .push(request.node_mapping.clone());

        if self.erroring.contains(&request.instance_id) {
            return Err(AppError::Remote(format!(
                "process instance {} is locked",
                request.instance_id
            )));
        }

        let now = Utc::now();
        let successful = !self.unsuccessful.contains(&request.instance_id);
        Ok(InstanceMigration {
            successful,
            start: now,
            end: now,
            logs: vec![if successful {
                format!("INFO migrated {}", request.instance_id)
            } else {
                format!("ERROR node mapping rejected for {}", request.instance_id)
            }],
        })
    }
}

/// Hands out mock clients per server id; servers can be taken offline and
/// brought back to exercise the registry's retry path.
#[derive(Default)]
pub struct MockClientFactory {
    clients: Mutex<HashMap<String, Arc<MockServerClient>>>,
    offline: Mutex<HashSet<String>>,
    misconfigured: Mutex<HashSet<String>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(self, server_id: &str, client: MockServerClient) -> Self {
        self.clients
            .lock()
            .unwrap()
            .insert(server_id.to_string(), Arc::new(client));
        self
    }

    pub fn offline(self, server_id: &str) -> Self {
        self.set_online(server_id, false);
        self
    }

    pub fn set_online(&self, server_id: &str, online: bool) {
        let mut offline = self.offline.lock().unwrap();
        if online {
            offline.remove(server_id);
        } else {
            offline.insert(server_id.to_string());
        }
    }

    /// Connecting to this server fails with a configuration error.
    pub fn misconfigured(self, server_id: &str) -> Self {
        self.set_misconfigured(server_id);
        self
    }

    pub fn set_misconfigured(&self, server_id: &str) {
        self.misconfigured
            .lock()
            .unwrap()
            .insert(server_id.to_string());
    }

    pub fn client(&self, server_id: &str) -> Option<Arc<MockServerClient>> {
        self.clients.lock().unwrap().get(server_id).cloned()
    }

    pub fn attempts(&self, server_id: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(server_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn connect(
        &self,
        server: &ServerConfig,
        _auth: &ServerAuth,
    ) -> Result<Arc<dyn ProcessServerClient>> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(server.id.clone())
            .or_insert(0) += 1;

        if self.misconfigured.lock().unwrap().contains(&server.id) {
            return Err(AppError::Configuration(format!(
                "invalid client certificate for {}",
                server.id
            )));
        }
        if self.offline.lock().unwrap().contains(&server.id) {
            return Err(AppError::EndpointNotFound(server.host.clone()));
        }

        let client = self
            .clients
            .lock()
            .unwrap()
            .entry(server.id.clone())
            .or_insert_with(|| {
                Arc::new(MockServerClient::new().with_identity(&server.id, server.display_name()))
            })
            .clone();
        Ok(client)
    }
}

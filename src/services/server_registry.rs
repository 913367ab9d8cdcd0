use crate::client::{
    ClientFactory, InstanceFilter, PAGE_SIZE, ProcessInstanceSummary, ProcessServerClient,
};
use crate::config::secrets::SecretStore;
use crate::error::{AppError, Result};
use crate::models::{ServerAuth, ServerConfig, ServerIdentity};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

/// A configured server and, once it has answered, its client.
///
/// The client slot goes from empty to filled exactly once and never changes
/// afterwards, so readers need no lock.
pub struct ServerConnection {
    config: ServerConfig,
    auth: ServerAuth,
    client: OnceLock<Arc<dyn ProcessServerClient>>,
    identity: OnceLock<ServerIdentity>,
}

impl ServerConnection {
    fn new(config: ServerConfig, auth: ServerAuth) -> Self {
        Self {
            config,
            auth,
            client: OnceLock::new(),
            identity: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn client(&self) -> Option<Arc<dyn ProcessServerClient>> {
        self.client.get().cloned()
    }

    pub fn identity(&self) -> Option<&ServerIdentity> {
        self.identity.get()
    }

    pub fn is_connected(&self) -> bool {
        self.client.get().is_some()
    }

    /// The live client, or a connectivity error while the server is still
    /// being retried in the background.
    pub fn require_client(&self) -> Result<Arc<dyn ProcessServerClient>> {
        self.client().ok_or_else(|| {
            AppError::Connectivity(format!(
                "kie server {} is not connected yet",
                self.config.id
            ))
        })
    }

    fn install(&self, client: Arc<dyn ProcessServerClient>, identity: ServerIdentity) {
        let _ = self.identity.set(identity);
        if self.client.set(client).is_err() {
            tracing::debug!("Client for {} was already installed", self.config.id);
        }
    }
}

pub struct ServerRegistry {
    connections: Vec<Arc<ServerConnection>>,
    shutdown_tx: watch::Sender<bool>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerRegistry {
    /// Registers every server whose credentials resolve and tries to connect
    /// to each once. Servers that do not answer stay registered and are
    /// retried in the background every `retry_interval`. A server whose client
    /// cannot be built from its configuration is skipped.
    pub async fn load(
        servers: &[ServerConfig],
        secrets: &dyn SecretStore,
        factory: Arc<dyn ClientFactory>,
        retry_interval: Duration,
    ) -> Self {
        let mut connections = Vec::with_capacity(servers.len());
        let mut pending = Vec::new();

        for server in servers {
            let auth = match server.resolve_auth(secrets) {
                Ok(auth) => auth,
                Err(e) => {
                    tracing::error!(
                        "Skipping kie server {}: invalid configuration: {}",
                        server.id,
                        e
                    );
                    continue;
                }
            };

            let connection = Arc::new(ServerConnection::new(server.clone(), auth));
            match establish(factory.as_ref(), &connection).await {
                Ok(()) => {}
                Err(e) if is_permanent(&e) => {
                    tracing::error!("Skipping kie server {}: {}", server.id, e);
                    continue;
                }
                Err(e) => {
                    tracing::info!(
                        "Unable to create kie server configuration for {}: {}. Retry asynchronously",
                        server.id,
                        e
                    );
                    pending.push(connection.clone());
                }
            }
            tracing::info!("Loaded kie server configuration for: {:?}", server);
            connections.push(connection);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let retry_task = if pending.is_empty() {
            None
        } else {
            Some(tokio::spawn(retry_connections(
                pending,
                factory,
                retry_interval,
                shutdown_rx,
            )))
        };

        Self {
            connections,
            shutdown_tx,
            retry_task: Mutex::new(retry_task),
        }
    }

    pub fn resolve(&self, server_id: &str) -> Result<Arc<ServerConnection>> {
        self.connections
            .iter()
            .find(|connection| connection.id() == server_id)
            .cloned()
            .ok_or_else(|| AppError::UnknownServer(server_id.to_string()))
    }

    pub fn has_server(&self, server_id: &str) -> bool {
        self.connections
            .iter()
            .any(|connection| connection.id() == server_id)
    }

    pub fn connections(&self) -> &[Arc<ServerConnection>] {
        &self.connections
    }

    pub async fn list_containers(&self, server_id: &str) -> Result<Vec<String>> {
        let client = self.resolve(server_id)?.require_client()?;
        client.list_containers().await
    }

    /// Every process definition id on the server, grouped by container.
    pub async fn definitions(&self, server_id: &str) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let client = self.resolve(server_id)?.require_client()?;
        let mut definitions = BTreeMap::new();

        for container_id in client.list_containers().await? {
            let mut ids = BTreeSet::new();
            let mut page = 0;
            loop {
                let batch = client
                    .find_process_definitions(&container_id, page, PAGE_SIZE)
                    .await?;
                let fetched = batch.len();
                ids.extend(batch);
                if fetched < PAGE_SIZE as usize {
                    break;
                }
                page += 1;
            }
            definitions.insert(container_id, ids);
        }

        Ok(definitions)
    }

    /// One page of the active instances in a container.
    pub async fn running_instances(
        &self,
        server_id: &str,
        container_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ProcessInstanceSummary>> {
        let client = self.resolve(server_id)?.require_client()?;
        client
            .find_instances(container_id, &InstanceFilter::default(), page, page_size)
            .await
    }

    /// Stops the retry task, waiting at most `timeout` before aborting it.
    pub async fn shutdown(&self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        let Some(handle) = self.retry_task.lock().await.take() else {
            return;
        };

        let abort = handle.abort_handle();
        if tokio::time::timeout(timeout, handle).await.is_err() {
            tracing::warn!("Connection retry task did not stop within {:?}; aborting", timeout);
            abort.abort();
        }
    }
}

/// Failures that retrying cannot fix.
fn is_permanent(err: &AppError) -> bool {
    matches!(err, AppError::Configuration(_) | AppError::Credentials(_))
}

async fn establish(factory: &dyn ClientFactory, connection: &ServerConnection) -> Result<()> {
    let client = factory.connect(&connection.config, &connection.auth).await?;
    let identity = client.identify().await?;
    tracing::info!(
        "Connected to kie server {} ({} / {})",
        connection.id(),
        identity.name,
        identity.server_id
    );
    connection.install(client, identity);
    Ok(())
}

async fn retry_connections(
    mut pending: Vec<Arc<ServerConnection>>,
    factory: Arc<dyn ClientFactory>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    while !pending.is_empty() {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!("Connection retry task stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let mut still_pending = Vec::with_capacity(pending.len());
        for connection in pending {
            tracing::debug!("Trying to create client for {}", connection.id());
            match establish(factory.as_ref(), &connection).await {
                Ok(()) => {}
                Err(e) if is_permanent(&e) => {
                    tracing::error!(
                        "Giving up on kie server {}: {}",
                        connection.id(),
                        e
                    );
                    continue;
                }
                Err(AppError::EndpointNotFound(host)) => tracing::warn!(
                    "Unable to connect to kie server {} at {}. The client will try to reconnect in the background",
                    connection.id(),
                    host
                ),
                Err(e) => tracing::warn!(
                    "Unable to create client for kie server {}: {}",
                    connection.id(),
                    e
                ),
            }

            if connection.is_connected() {
                tracing::debug!("Client for {} created", connection.id());
            } else {
                tracing::debug!("Client for {} could not be created. Retrying...", connection.id());
                still_pending.push(connection);
            }
        }
        pending = still_pending;
    }
}

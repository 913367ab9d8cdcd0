//! Shared fixtures for unit tests.

use crate::client::mock::MockServerClient;
use crate::models::{ExecutionSpec, MigrationDefinition, Plan, ProcessRef, ServerConfig};
use crate::repository::{DbPool, establish_connection};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub const SOURCE_CONTAINER_ID: &str = "test_1.0.0";
pub const TARGET_CONTAINER_ID: &str = "test_2.0.0";
pub const PROCESS_ID: &str = "test.myprocess";

pub async fn test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("test.db").display());
    let pool = establish_connection(&url).await.unwrap();
    (dir, pool)
}

pub fn definition(plan_id: &str, server_id: &str, ids: Option<Vec<i64>>) -> MigrationDefinition {
    MigrationDefinition {
        plan_id: plan_id.to_string(),
        server_id: server_id.to_string(),
        process_instance_ids: ids,
        execution: ExecutionSpec::default(),
        requester: Some("me".to_string()),
    }
}

pub fn plan(id: &str) -> Plan {
    let now = Utc::now();
    Plan {
        id: id.to_string(),
        name: "test-plan".to_string(),
        description: Some("the test plan".to_string()),
        source: ProcessRef {
            container_id: SOURCE_CONTAINER_ID.to_string(),
            process_id: PROCESS_ID.to_string(),
        },
        target: ProcessRef {
            container_id: TARGET_CONTAINER_ID.to_string(),
            process_id: PROCESS_ID.to_string(),
        },
        mappings: HashMap::from([("_A1".to_string(), "_B1".to_string())]),
        created_at: now,
        updated_at: now,
    }
}

pub fn server_config(id: &str) -> ServerConfig {
    ServerConfig {
        id: id.to_string(),
        name: None,
        host: format!("http://localhost:8080/{}/services/rest/server", id),
        username: Some("admin".to_string()),
        password: Some("admin123".to_string()),
        token: None,
        credentials_provider: None,
        client_cert: None,
    }
}

/// PEM files under `testdata/tls`. `keystore.pem` holds a key encrypted
/// with the password `changeit`.
pub fn tls_fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("tls")
        .join(name)
}

/// A reachable server hosting both sides of [`plan`].
pub fn mock_client(server_id: &str) -> MockServerClient {
    MockServerClient::new()
        .with_identity(server_id, &format!("{} name", server_id))
        .with_definition(SOURCE_CONTAINER_ID, PROCESS_ID)
        .with_definition(TARGET_CONTAINER_ID, PROCESS_ID)
}

/// Polls `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

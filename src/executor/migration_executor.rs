use crate::client::{InstanceFilter, MigrateInstance, PAGE_SIZE, ProcessServerClient};
use crate::error::{AppError, Result};
use crate::models::{Migration, MigrationReport, MigrationStatus, Plan, ProcessRef};
use crate::repository::{MigrationRepository, PlanRepository};
use crate::services::JobRunner;
use crate::services::server_registry::ServerRegistry;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Runs migrations: claims them, migrates every target instance and
/// records one report per instance.
#[derive(Clone)]
pub struct MigrationExecutor {
    migrations: MigrationRepository,
    plans: PlanRepository,
    registry: Arc<ServerRegistry>,
    http: reqwest::Client,
}

/// Aggregate of a batch. Only the first failure is kept.
#[derive(Debug, Default)]
struct BatchOutcome {
    first_failure: Option<String>,
}

impl BatchOutcome {
    fn record(&mut self, failure: Option<String>) {
        if self.first_failure.is_none() {
            self.first_failure = failure;
        }
    }

    fn into_status(self) -> (MigrationStatus, Option<String>) {
        match self.first_failure {
            None => (MigrationStatus::Completed, None),
            Some(message) => (MigrationStatus::Failed, Some(message)),
        }
    }
}

impl MigrationExecutor {
    /// `callback_timeout` bounds the whole callback request.
    pub fn new(
        migrations: MigrationRepository,
        plans: PlanRepository,
        registry: Arc<ServerRegistry>,
        callback_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(callback_timeout)
            .build()?;
        Ok(Self {
            migrations,
            plans,
            registry,
            http,
        })
    }

    /// Runs a pending migration to a terminal status.
    ///
    /// Fails with `InvalidMigrationState` when the migration is not pending
    /// or another run claimed it first. Once claimed, every failure ends in
    /// `Failed` with its message recorded.
    pub async fn run(&self, migration_id: &str) -> Result<Migration> {
        let migration = self.migrations.get(migration_id).await?;
        if !migration.status.is_pending() || !self.migrations.try_start(migration_id).await? {
            let status = self
                .migrations
                .get(migration_id)
                .await
                .map(|current| current.status)
                .unwrap_or(migration.status);
            return Err(AppError::InvalidMigrationState {
                id: migration_id.to_string(),
                status,
                operation: "run",
            });
        }
        tracing::info!("Migration {} started", migration_id);

        let (status, error_message) = match self.execute(&migration).await {
            Ok(outcome) => outcome.into_status(),
            Err(e) => {
                tracing::error!("Migration {} failed: {}", migration_id, e);
                (MigrationStatus::Failed, Some(e.to_string()))
            }
        };

        if !self
            .migrations
            .finish(migration_id, status, error_message)
            .await?
        {
            tracing::warn!("Migration {} left STARTED before it could finish", migration_id);
        }

        let migration = self.migrations.get(migration_id).await?;
        tracing::info!("Migration {} finished with status {}", migration_id, migration.status);
        self.notify(&migration).await;
        Ok(migration)
    }

    async fn execute(&self, migration: &Migration) -> Result<BatchOutcome> {
        let definition = &migration.definition;
        let plan = self.plans.get(&definition.plan_id).await?;
        let client = self
            .registry
            .resolve(&definition.server_id)?
            .require_client()?;

        let instance_ids = match definition.explicit_instances() {
            Some(ids) => ids.to_vec(),
            None => discover_instances(client.as_ref(), &plan.source).await?,
        };
        tracing::debug!(
            "Migration {} targets {} instance(s) of {}",
            migration.id,
            instance_ids.len(),
            plan.source
        );

        let mut outcome = BatchOutcome::default();
        for instance_id in instance_ids {
            let (report, failure) =
                migrate_instance(client.as_ref(), &migration.id, &plan, instance_id).await;
            outcome.record(failure);
            self.migrations.add_report(&report).await?;
        }

        Ok(outcome)
    }

    async fn notify(&self, migration: &Migration) {
        let Some(url) = &migration.definition.execution.callback_url else {
            return;
        };

        let payload = match serde_json::to_vec(migration) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Unable to encode callback for migration {}: {}", migration.id, e);
                return;
            }
        };

        let result = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => tracing::debug!("Notified {} about migration {}", url, migration.id),
            Err(e) => tracing::warn!(
                "Callback to {} for migration {} failed: {}",
                url,
                migration.id,
                e
            ),
        }
    }
}

#[async_trait]
impl JobRunner for MigrationExecutor {
    async fn run_job(&self, migration_id: &str) -> Result<()> {
        self.run(migration_id).await.map(|_| ())
    }
}

/// Collects the ids of every active instance of `source`, page by page,
/// before any of them is migrated. Paging stops at the first short page.
async fn discover_instances(
    client: &dyn ProcessServerClient,
    source: &ProcessRef,
) -> Result<Vec<i64>> {
    let filter = InstanceFilter::default();
    let mut ids = Vec::new();
    let mut page = 0;

    loop {
        let instances = client
            .find_instances(&source.container_id, &filter, page, PAGE_SIZE)
            .await?;
        let fetched = instances.len();
        ids.extend(
            instances
                .into_iter()
                .filter(|instance| instance.process_id == source.process_id)
                .map(|instance| instance.id),
        );

        if fetched < PAGE_SIZE as usize {
            break;
        }
        page += 1;
    }

    Ok(ids)
}

async fn migrate_instance(
    client: &dyn ProcessServerClient,
    migration_id: &str,
    plan: &Plan,
    instance_id: i64,
) -> (MigrationReport, Option<String>) {
    let request = MigrateInstance {
        source_container_id: &plan.source.container_id,
        instance_id,
        target_container_id: &plan.target.container_id,
        target_process_id: &plan.target.process_id,
        node_mapping: &plan.mappings,
    };

    let id = uuid::Uuid::new_v4().to_string();
    match client.migrate_instance(request).await {
        Ok(result) => {
            let failure = (!result.successful)
                .then(|| format!("process instance {} was not migrated", instance_id));
            if let Some(message) = &failure {
                tracing::warn!("Migration {}: {}", migration_id, message);
            }
            let report = MigrationReport {
                id,
                migration_id: migration_id.to_string(),
                process_instance_id: instance_id,
                start_date: result.start,
                end_date: result.end,
                successful: result.successful,
                logs: result.logs,
            };
            (report, failure)
        }
        Err(e) => {
            tracing::warn!(
                "Migration {}: process instance {} failed: {}",
                migration_id,
                instance_id,
                e
            );
            let now = Utc::now();
            let message = e.to_string();
            let report = MigrationReport {
                id,
                migration_id: migration_id.to_string(),
                process_instance_id: instance_id,
                start_date: now,
                end_date: now,
                successful: false,
                logs: vec![message.clone()],
            };
            (report, Some(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockClientFactory, MockServerClient};
    use crate::config::secrets::FileSecretStore;
    use crate::models::MigrationDefinition;
    use crate::test_utils;
    use axum::{Json, Router, extract::State, routing::post};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    const SERVER_ID: &str = "kie-server-1";
    const CALLBACK_TIMEOUT: Duration = Duration::from_millis(300);

    struct Fixture {
        _dir: TempDir,
        executor: MigrationExecutor,
        migrations: MigrationRepository,
        factory: Arc<MockClientFactory>,
    }

    impl Fixture {
        fn client(&self) -> Arc<MockServerClient> {
            self.factory.client(SERVER_ID).unwrap()
        }

        async fn create(&self, definition: &MigrationDefinition) -> Migration {
            self.migrations.create(definition).await.unwrap()
        }
    }

    async fn fixture(client: MockServerClient) -> Fixture {
        let (dir, pool) = test_utils::test_pool().await;
        let migrations = MigrationRepository::new(pool.clone());
        let plans = PlanRepository::new(pool);
        plans.create(&test_utils::plan("plan-1")).await.unwrap();

        let factory = Arc::new(
            MockClientFactory::new()
                .with_client(SERVER_ID, client)
                .offline("kie-server-offline"),
        );
        let servers = vec![
            test_utils::server_config(SERVER_ID),
            test_utils::server_config("kie-server-offline"),
        ];
        let registry = ServerRegistry::load(
            &servers,
            &FileSecretStore::default(),
            factory.clone(),
            Duration::from_secs(60),
        )
        .await;

        Fixture {
            _dir: dir,
            executor: MigrationExecutor::new(
                migrations.clone(),
                plans,
                Arc::new(registry),
                CALLBACK_TIMEOUT,
            )
            .unwrap(),
            migrations,
            factory,
        }
    }

    #[tokio::test]
    async fn explicit_instances_complete_with_one_report_each() {
        let fixture = fixture(test_utils::mock_client(SERVER_ID)).await;
        let migration = fixture
            .create(&test_utils::definition("plan-1", SERVER_ID, Some(vec![5, 6, 7])))
            .await;

        let finished = fixture.executor.run(&migration.id).await.unwrap();

        assert_eq!(finished.status, MigrationStatus::Completed);
        assert!(finished.started_at.is_some());
        assert!(finished.finished_at.is_some());
        assert!(finished.error_message.is_none());

        let reports = fixture.migrations.list_reports(&migration.id).await.unwrap();
        let ids: Vec<i64> = reports.iter().map(|r| r.process_instance_id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
        assert!(reports.iter().all(|r| r.successful));

        let client = fixture.client();
        assert_eq!(client.migrated(), vec![5, 6, 7]);
        assert_eq!(client.page_requests(), 0);
        assert_eq!(
            client.mappings_seen()[0].get("_A1").map(String::as_str),
            Some("_B1")
        );
    }

    #[tokio::test]
    async fn discovery_pages_until_a_short_page() {
        let client = test_utils::mock_client(SERVER_ID)
            .with_instances(test_utils::PROCESS_ID, 1..=200)
            .with_instances("other.process", 201..=220)
            .with_instances(test_utils::PROCESS_ID, 221..=270);
        let fixture = fixture(client).await;
        let migration = fixture
            .create(&test_utils::definition("plan-1", SERVER_ID, None))
            .await;

        let finished = fixture.executor.run(&migration.id).await.unwrap();

        assert_eq!(finished.status, MigrationStatus::Completed);
        let client = fixture.client();
        assert_eq!(client.page_requests(), 3);
        assert_eq!(client.migrated().len(), 250);
        assert!(!client.migrated().contains(&205));

        let reports = fixture.migrations.list_reports(&migration.id).await.unwrap();
        assert_eq!(reports.len(), 250);
    }

    #[tokio::test]
    async fn discovery_requests_an_empty_page_after_a_full_one() {
        let client =
            test_utils::mock_client(SERVER_ID).with_instances(test_utils::PROCESS_ID, 1..=200);
        let fixture = fixture(client).await;
        let migration = fixture
            .create(&test_utils::definition("plan-1", SERVER_ID, Some(Vec::new())))
            .await;

        fixture.executor.run(&migration.id).await.unwrap();

        let client = fixture.client();
        assert_eq!(client.page_requests(), 3);
        assert_eq!(client.migrated().len(), 200);
    }

    #[tokio::test]
    async fn no_instances_completes_without_reports() {
        let fixture = fixture(test_utils::mock_client(SERVER_ID)).await;
        let migration = fixture
            .create(&test_utils::definition("plan-1", SERVER_ID, None))
            .await;

        let finished = fixture.executor.run(&migration.id).await.unwrap();

        assert_eq!(finished.status, MigrationStatus::Completed);
        assert!(fixture.migrations.list_reports(&migration.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_error_fails_migration_but_batch_continues() {
        let client = test_utils::mock_client(SERVER_ID).erroring_instance(2);
        let fixture = fixture(client).await;
        let migration = fixture
            .create(&test_utils::definition("plan-1", SERVER_ID, Some(vec![1, 2, 3])))
            .await;

        let finished = fixture.executor.run(&migration.id).await.unwrap();

        assert_eq!(finished.status, MigrationStatus::Failed);
        assert!(finished.finished_at.is_some());
        assert!(finished.error_message.as_deref().unwrap().contains("locked"));
        assert_eq!(fixture.client().migrated(), vec![1, 2, 3]);

        let reports = fixture.migrations.list_reports(&migration.id).await.unwrap();
        let outcomes: Vec<bool> = reports.iter().map(|r| r.successful).collect();
        assert_eq!(outcomes, vec![true, false, true]);
        assert!(reports[1].logs[0].contains("locked"));
    }

    #[tokio::test]
    async fn first_failure_message_is_kept() {
        let client = test_utils::mock_client(SERVER_ID)
            .unsuccessful_instance(2)
            .erroring_instance(3);
        let fixture = fixture(client).await;
        let migration = fixture
            .create(&test_utils::definition("plan-1", SERVER_ID, Some(vec![1, 2, 3])))
            .await;

        let finished = fixture.executor.run(&migration.id).await.unwrap();

        assert_eq!(finished.status, MigrationStatus::Failed);
        assert_eq!(
            finished.error_message.as_deref(),
            Some("process instance 2 was not migrated")
        );
    }

    #[tokio::test]
    async fn second_run_is_rejected_and_changes_nothing() {
        let fixture = fixture(test_utils::mock_client(SERVER_ID)).await;
        let migration = fixture
            .create(&test_utils::definition("plan-1", SERVER_ID, Some(vec![1])))
            .await;
        let first = fixture.executor.run(&migration.id).await.unwrap();

        let err = fixture.executor.run(&migration.id).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::InvalidMigrationState {
                status: MigrationStatus::Completed,
                operation: "run",
                ..
            }
        ));
        assert_eq!(fixture.migrations.get(&migration.id).await.unwrap(), first);
        assert_eq!(fixture.migrations.list_reports(&migration.id).await.unwrap().len(), 1);
        assert_eq!(fixture.client().migrated(), vec![1]);
    }

    #[tokio::test]
    async fn unconnected_server_fails_the_run() {
        let fixture = fixture(test_utils::mock_client(SERVER_ID)).await;
        let migration = fixture
            .create(&test_utils::definition("plan-1", "kie-server-offline", Some(vec![1])))
            .await;

        let finished = fixture.executor.run(&migration.id).await.unwrap();

        assert_eq!(finished.status, MigrationStatus::Failed);
        assert!(finished.finished_at.is_some());
        assert!(finished.error_message.unwrap().contains("not connected"));
    }

    #[tokio::test]
    async fn missing_migration_is_reported() {
        let fixture = fixture(test_utils::mock_client(SERVER_ID)).await;

        let err = fixture.executor.run("nope").await.unwrap_err();
        assert!(matches!(err, AppError::MigrationNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn callback_receives_finished_migration() {
        let received: Arc<StdMutex<Vec<serde_json::Value>>> = Arc::default();
        let app = Router::new()
            .route(
                "/callback",
                post(
                    |State(received): State<Arc<StdMutex<Vec<serde_json::Value>>>>,
                     Json(body): Json<serde_json::Value>| async move {
                        received.lock().unwrap().push(body);
                    },
                ),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fixture = fixture(test_utils::mock_client(SERVER_ID)).await;
        let mut definition = test_utils::definition("plan-1", SERVER_ID, Some(vec![1]));
        definition.execution.callback_url = Some(format!("http://{}/callback", addr));
        let migration = fixture.create(&definition).await;

        fixture.executor.run(&migration.id).await.unwrap();

        let received = received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["id"], migration.id.as_str());
        assert_eq!(received[0]["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn unreachable_callback_does_not_change_outcome() {
        let fixture = fixture(test_utils::mock_client(SERVER_ID)).await;
        let mut definition = test_utils::definition("plan-1", SERVER_ID, Some(vec![1]));
        definition.execution.callback_url = Some("http://127.0.0.1:9/callback".to_string());
        let migration = fixture.create(&definition).await;

        let finished = fixture.executor.run(&migration.id).await.unwrap();
        assert_eq!(finished.status, MigrationStatus::Completed);
    }

    #[tokio::test]
    async fn stalled_callback_is_cut_off_by_timeout() {
        let app = Router::new().route(
            "/callback",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fixture = fixture(test_utils::mock_client(SERVER_ID)).await;
        let mut definition = test_utils::definition("plan-1", SERVER_ID, Some(vec![1]));
        definition.execution.callback_url = Some(format!("http://{}/callback", addr));
        let migration = fixture.create(&definition).await;

        let run = fixture.executor.run(&migration.id);
        let finished = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run should not wait for a stalled callback")
            .unwrap();
        assert_eq!(finished.status, MigrationStatus::Completed);
    }
}

use crate::error::{AppError, Result};
use crate::executor::MigrationExecutor;
use crate::models::{Migration, MigrationDefinition, MigrationReport, MigrationStatus};
use crate::repository::{MigrationRepository, PlanRepository};
use crate::services::scheduler_service::JobScheduler;
use crate::services::server_registry::ServerRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const INTERRUPTED_MESSAGE: &str = "Migration interrupted by a restart before it finished";

#[derive(Clone)]
pub struct MigrationService {
    migrations: MigrationRepository,
    plans: PlanRepository,
    registry: Arc<ServerRegistry>,
    executor: Arc<MigrationExecutor>,
    scheduler: JobScheduler,
}

impl MigrationService {
    pub fn new(
        migrations: MigrationRepository,
        plans: PlanRepository,
        registry: Arc<ServerRegistry>,
        executor: Arc<MigrationExecutor>,
        scheduler: JobScheduler,
    ) -> Self {
        Self {
            migrations,
            plans,
            registry,
            executor,
            scheduler,
        }
    }

    /// Validates and stores a migration. Sync migrations run before this
    /// returns; async ones are handed to the scheduler.
    pub async fn submit(&self, definition: MigrationDefinition) -> Result<Migration> {
        self.validate(&definition).await?;

        let migration = self.migrations.create(&definition).await?;
        tracing::info!(
            "Migration {} created for plan {} on {}",
            migration.id,
            definition.plan_id,
            definition.server_id
        );

        if definition.is_async() {
            self.migrations.mark_scheduled(&migration.id).await?;
            self.scheduler
                .schedule(&migration.id, definition.execution.scheduled_start_time)
                .await;
            return self.migrations.get(&migration.id).await;
        }

        self.executor.run(&migration.id).await
    }

    async fn validate(&self, definition: &MigrationDefinition) -> Result<()> {
        let connection = self.registry.resolve(&definition.server_id)?;
        let plan = self.plans.get(&definition.plan_id).await?;
        let client = connection.require_client()?;

        for process in [&plan.source, &plan.target] {
            if !client
                .find_process_definition(&process.container_id, &process.process_id)
                .await?
            {
                return Err(AppError::ProcessDefinitionNotFound {
                    server_id: definition.server_id.clone(),
                    container_id: process.container_id.clone(),
                    process_id: process.process_id.clone(),
                });
            }
        }

        if let Some(url) = &definition.execution.callback_url {
            reqwest::Url::parse(url).map_err(|e| {
                AppError::InvalidMigration(format!("invalid callback url {}: {}", url, e))
            })?;
        }

        Ok(())
    }

    /// Stops a migration that has not started. The pending trigger, if any,
    /// is dropped after the status change so a late fire finds it cancelled.
    pub async fn cancel(&self, id: &str) -> Result<Migration> {
        let migration = self.migrations.get(id).await?;
        if !migration.status.is_pending() || !self.migrations.try_cancel(id).await? {
            return Err(self.invalid_state(&migration, "cancel").await);
        }

        if self.scheduler.cancel(id).await {
            tracing::debug!("Removed pending job of migration {}", id);
        }
        tracing::info!("Migration {} cancelled", id);
        self.migrations.get(id).await
    }

    /// Moves the start time of a scheduled migration.
    pub async fn reschedule(
        &self,
        id: &str,
        scheduled_start_time: Option<DateTime<Utc>>,
    ) -> Result<Migration> {
        let migration = self.migrations.get(id).await?;
        if migration.status != MigrationStatus::Scheduled
            || !self
                .migrations
                .update_scheduled_start(id, scheduled_start_time)
                .await?
        {
            return Err(self.invalid_state(&migration, "reschedule").await);
        }

        self.scheduler.reschedule(id, scheduled_start_time).await;
        tracing::info!("Migration {} rescheduled to {:?}", id, scheduled_start_time);
        self.migrations.get(id).await
    }

    pub async fn get(&self, id: &str) -> Result<Migration> {
        self.migrations.get(id).await
    }

    pub async fn list(&self, status: Option<MigrationStatus>) -> Result<Vec<Migration>> {
        match status {
            Some(status) => self.migrations.list_by_status(status).await,
            None => self.migrations.list_all().await,
        }
    }

    pub async fn get_results(&self, id: &str) -> Result<Vec<MigrationReport>> {
        self.migrations.get(id).await?;
        self.migrations.list_reports(id).await
    }

    pub async fn get_report(&self, migration_id: &str, report_id: &str) -> Result<MigrationReport> {
        let report = self.migrations.get_report(report_id).await?;
        if report.migration_id != migration_id {
            return Err(AppError::ReportNotFound(report_id.to_string()));
        }
        Ok(report)
    }

    /// Re-registers triggers lost with the previous process and fails runs
    /// it left behind.
    pub async fn resume_pending(&self) -> Result<()> {
        for migration in self.migrations.list_by_status(MigrationStatus::Started).await? {
            tracing::warn!("Migration {} was interrupted, marking it failed", migration.id);
            self.migrations
                .finish(
                    &migration.id,
                    MigrationStatus::Failed,
                    Some(INTERRUPTED_MESSAGE.to_string()),
                )
                .await?;
        }

        for migration in self.migrations.list_by_status(MigrationStatus::Created).await? {
            if migration.definition.is_async() {
                self.migrations.mark_scheduled(&migration.id).await?;
            }
        }

        let scheduled = self
            .migrations
            .list_by_status(MigrationStatus::Scheduled)
            .await?;
        for migration in &scheduled {
            self.scheduler
                .schedule(
                    &migration.id,
                    migration.definition.execution.scheduled_start_time,
                )
                .await;
        }
        tracing::info!("Resumed {} scheduled migration(s)", scheduled.len());

        Ok(())
    }

    async fn invalid_state(&self, migration: &Migration, operation: &'static str) -> AppError {
        let status = self
            .migrations
            .get(&migration.id)
            .await
            .map(|current| current.status)
            .unwrap_or(migration.status);
        AppError::InvalidMigrationState {
            id: migration.id.clone(),
            status,
            operation,
        }
    }
}

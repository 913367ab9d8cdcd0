use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Work invoked when a trigger fires. Receives only the migration id and
/// must load whatever state it needs itself.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, migration_id: &str) -> Result<()>;
}

struct ScheduledJob {
    generation: u64,
    handle: JoinHandle<()>,
}

/// One-shot triggers keyed by migration id.
///
/// A trigger removes its own entry before invoking the runner, so a job that
/// has started is never aborted by `cancel` or `reschedule`, and a key fires
/// at most once per `schedule`.
#[derive(Clone)]
pub struct JobScheduler {
    jobs: Arc<Mutex<HashMap<String, ScheduledJob>>>,
    generation: Arc<AtomicU64>,
    runner: Arc<dyn JobRunner>,
}

impl JobScheduler {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            runner,
        }
    }

    /// Registers a trigger for `migration_id`. Without a start time, or with
    /// one already in the past, the trigger fires right away.
    pub async fn schedule(&self, migration_id: &str, start_at: Option<DateTime<Utc>>) {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(migration_id) {
            tracing::error!(
                "Migration {} already has a scheduled job, keeping the existing one",
                migration_id
            );
            return;
        }

        let job = self.spawn_job(migration_id, start_at);
        jobs.insert(migration_id.to_string(), job);
        tracing::debug!("Scheduled migration {} at {:?}", migration_id, start_at);
    }

    /// Moves an existing trigger to a new start time. Unknown keys are only logged.
    pub async fn reschedule(&self, migration_id: &str, start_at: Option<DateTime<Utc>>) {
        let mut jobs = self.jobs.lock().await;
        let Some(previous) = jobs.remove(migration_id) else {
            tracing::warn!(
                "Unable to reschedule migration {}: no pending job found",
                migration_id
            );
            return;
        };

        previous.handle.abort();
        let job = self.spawn_job(migration_id, start_at);
        jobs.insert(migration_id.to_string(), job);
        tracing::debug!("Rescheduled migration {} at {:?}", migration_id, start_at);
    }

    /// Drops the pending trigger for `migration_id`. Returns false when none was pending.
    pub async fn cancel(&self, migration_id: &str) -> bool {
        match self.jobs.lock().await.remove(migration_id) {
            Some(job) => {
                job.handle.abort();
                tracing::debug!("Cancelled job for migration {}", migration_id);
                true
            }
            None => false,
        }
    }

    pub async fn pending_jobs(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Aborts every trigger that has not fired yet.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (migration_id, job) in jobs.drain() {
            tracing::debug!("Dropping pending job for migration {}", migration_id);
            job.handle.abort();
        }
    }

    fn spawn_job(&self, migration_id: &str, start_at: Option<DateTime<Utc>>) -> ScheduledJob {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = delay_until(start_at);
        let jobs = self.jobs.clone();
        let runner = self.runner.clone();
        let migration_id = migration_id.to_string();

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            {
                let mut jobs = jobs.lock().await;
                match jobs.get(&migration_id) {
                    Some(job) if job.generation == generation => {
                        jobs.remove(&migration_id);
                    }
                    _ => return,
                }
            }

            fire(runner.as_ref(), &migration_id).await;
        });

        ScheduledJob { generation, handle }
    }
}

fn delay_until(start_at: Option<DateTime<Utc>>) -> Duration {
    start_at
        .and_then(|at| (at - Utc::now()).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

async fn fire(runner: &dyn JobRunner, migration_id: &str) {
    tracing::info!("Executing scheduled migration {}", migration_id);
    match runner.run_job(migration_id).await {
        Ok(()) => {}
        Err(e @ (AppError::MigrationNotFound(_) | AppError::InvalidMigrationState { .. })) => {
            tracing::error!(
                "Unable to execute migration {}, job removed: {}",
                migration_id,
                e
            );
        }
        Err(e) => tracing::error!("Scheduled migration {} failed: {}", migration_id, e),
    }
}

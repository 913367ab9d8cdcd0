use crate::error::{AppError, Result};
use crate::models::{Plan, ProcessRef};
use crate::repository::PlanRepository;
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Plan storage. Node mappings are kept as given; only the server checks them.
#[derive(Clone)]
pub struct PlanService {
    repo: PlanRepository,
}

impl PlanService {
    pub fn new(repo: PlanRepository) -> Self {
        Self { repo }
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>> {
        self.repo.list().await
    }

    pub async fn get_plan(&self, id: &str) -> Result<Plan> {
        self.repo.get(id).await
    }

    pub async fn create_plan(
        &self,
        name: String,
        description: Option<String>,
        source: ProcessRef,
        target: ProcessRef,
        mappings: HashMap<String, String>,
    ) -> Result<Plan> {
        for process in [&source, &target] {
            if process.container_id.trim().is_empty() || process.process_id.trim().is_empty() {
                return Err(AppError::InvalidMigration(format!(
                    "plan {} needs both a container id and a process id, got {}",
                    name, process
                )));
            }
        }

        let now = Utc::now();
        let plan = Plan {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            source,
            target,
            mappings,
            created_at: now,
            updated_at: now,
        };

        self.repo.create(&plan).await?;
        tracing::info!("Plan {} created: {} -> {}", plan.id, plan.source, plan.target);
        Ok(plan)
    }
}

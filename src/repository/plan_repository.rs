use crate::error::{AppError, Result};
use crate::models::{Plan, ProcessRef};
use crate::repository::DbPool;
use chrono::{DateTime, Utc};

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: String,
    name: String,
    description: Option<String>,
    source_container_id: String,
    source_process_id: String,
    target_container_id: String,
    target_process_id: String,
    mappings: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PlanRow> for Plan {
    type Error = AppError;

    fn try_from(row: PlanRow) -> Result<Self> {
        let mappings = serde_json::from_str(&row.mappings)
            .map_err(|e| AppError::InvalidData(format!("mappings of plan {}: {}", row.id, e)))?;
        Ok(Plan {
            id: row.id,
            name: row.name,
            description: row.description,
            source: ProcessRef {
                container_id: row.source_container_id,
                process_id: row.source_process_id,
            },
            target: ProcessRef {
                container_id: row.target_container_id,
                process_id: row.target_process_id,
            },
            mappings,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PlanRepository {
    pool: DbPool,
}

impl PlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, plan: &Plan) -> Result<()> {
        let mappings = serde_json::to_string(&plan.mappings)
            .map_err(|e| AppError::InvalidData(format!("plan mappings: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO plans (
                id, name, description, source_container_id, source_process_id,
                target_container_id, target_process_id, mappings, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(&plan.source.container_id)
        .bind(&plan.source.process_id)
        .bind(&plan.target.container_id)
        .bind(&plan.target.process_id)
        .bind(mappings)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Plan> {
        let row = sqlx::query_as::<_, PlanRow>("SELECT * FROM plans WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::PlanNotFound(id.to_string()))?;

        row.try_into()
    }

    pub async fn list(&self) -> Result<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRow>("SELECT * FROM plans ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Plan::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    #[tokio::test]
    async fn stored_plan_keeps_its_node_mapping() {
        let (_dir, pool) = test_utils::test_pool().await;
        let repo = PlanRepository::new(pool);
        let plan = test_utils::plan("plan-1");

        repo.create(&plan).await.unwrap();
        let loaded = repo.get("plan-1").await.unwrap();

        assert_eq!(loaded.source, plan.source);
        assert_eq!(loaded.target, plan.target);
        assert_eq!(loaded.mappings, plan.mappings);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_plan_is_not_found() {
        let (_dir, pool) = test_utils::test_pool().await;
        let repo = PlanRepository::new(pool);

        assert!(matches!(
            repo.get("absent").await.unwrap_err(),
            AppError::PlanNotFound(_)
        ));
    }
}

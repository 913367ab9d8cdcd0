use crate::models::{Plan, ProcessRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    pub source: ProcessRef,
    pub target: ProcessRef,
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub source: ProcessRef,
    pub target: ProcessRef,
    pub mappings: HashMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            description: plan.description,
            source: plan.source,
            target: plan.target,
            mappings: plan.mappings,
            created_at: plan.created_at.to_rfc3339(),
            updated_at: plan.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlansListResponse {
    pub data: Vec<PlanResponse>,
}

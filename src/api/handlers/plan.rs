use crate::api::dto::plan::{CreatePlanRequest, PlanResponse, PlansListResponse};
use crate::api::routes::AppState;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<PlansListResponse>> {
    let plans = state.plan_service.list_plans().await?;
    let response = PlansListResponse {
        data: plans.into_iter().map(PlanResponse::from).collect(),
    };
    Ok(Json(response))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanResponse>> {
    let plan = state.plan_service.get_plan(&id).await?;
    Ok(Json(PlanResponse::from(plan)))
}

pub async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanResponse>)> {
    let plan = state
        .plan_service
        .create_plan(req.name, req.description, req.source, req.target, req.mappings)
        .await?;

    Ok((StatusCode::CREATED, Json(PlanResponse::from(plan))))
}

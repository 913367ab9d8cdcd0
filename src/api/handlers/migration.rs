use crate::api::dto::migration::{
    MigrationResponse, MigrationsListResponse, ReportResponse, ReportsListResponse,
    RescheduleMigrationRequest, SubmitMigrationRequest,
};
use crate::api::routes::AppState;
use crate::error::{AppError, Result};
use crate::models::MigrationStatus;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::collections::HashMap;

pub async fn submit_migration(
    State(state): State<AppState>,
    Json(req): Json<SubmitMigrationRequest>,
) -> Result<(StatusCode, Json<MigrationResponse>)> {
    let migration = state.migration_service.submit(req.into()).await?;
    Ok((StatusCode::CREATED, Json(MigrationResponse::from(migration))))
}

pub async fn list_migrations(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<MigrationsListResponse>> {
    let status = params
        .get("status")
        .map(|value| {
            MigrationStatus::parse(value)
                .ok_or_else(|| AppError::InvalidMigration(format!("unknown status {}", value)))
        })
        .transpose()?;

    let migrations = state.migration_service.list(status).await?;
    let response = MigrationsListResponse {
        data: migrations
            .into_iter()
            .map(MigrationResponse::from)
            .collect(),
    };
    Ok(Json(response))
}

pub async fn get_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MigrationResponse>> {
    let migration = state.migration_service.get(&id).await?;
    Ok(Json(MigrationResponse::from(migration)))
}

pub async fn reschedule_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RescheduleMigrationRequest>,
) -> Result<Json<MigrationResponse>> {
    let migration = state
        .migration_service
        .reschedule(&id, req.scheduled_start_time)
        .await?;
    Ok(Json(MigrationResponse::from(migration)))
}

pub async fn cancel_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MigrationResponse>> {
    let migration = state.migration_service.cancel(&id).await?;
    Ok(Json(MigrationResponse::from(migration)))
}

pub async fn get_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportsListResponse>> {
    let reports = state.migration_service.get_results(&id).await?;
    let response = ReportsListResponse {
        data: reports.into_iter().map(ReportResponse::from).collect(),
    };
    Ok(Json(response))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path((id, report_id)): Path<(String, String)>,
) -> Result<Json<ReportResponse>> {
    let report = state.migration_service.get_report(&id, &report_id).await?;
    Ok(Json(ReportResponse::from(report)))
}

use crate::api::dto::server::{
    ContainersResponse, DefinitionsResponse, RunningInstanceResponse, RunningInstancesQuery,
    RunningInstancesResponse, ServerResponse, ServersListResponse,
};
use crate::api::routes::AppState;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, Query, State},
};

pub async fn list_servers(State(state): State<AppState>) -> Json<ServersListResponse> {
    let data = state
        .registry
        .connections()
        .iter()
        .map(|connection| ServerResponse::from(connection.as_ref()))
        .collect();
    Json(ServersListResponse { data })
}

pub async fn list_containers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContainersResponse>> {
    let containers = state.registry.list_containers(&id).await?;
    Ok(Json(ContainersResponse {
        server_id: id,
        containers,
    }))
}

pub async fn list_definitions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DefinitionsResponse>> {
    let definitions = state.registry.definitions(&id).await?;
    Ok(Json(DefinitionsResponse {
        server_id: id,
        definitions,
    }))
}

pub async fn list_running_instances(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RunningInstancesQuery>,
) -> Result<Json<RunningInstancesResponse>> {
    if query.page_size == 0 {
        return Err(AppError::InvalidMigration(
            "page_size must be greater than zero".to_string(),
        ));
    }

    let instances = state
        .registry
        .running_instances(&id, &query.container_id, query.page, query.page_size)
        .await?;
    let data = instances
        .into_iter()
        .enumerate()
        .map(|(i, instance)| RunningInstanceResponse::new(i + 1, instance))
        .collect();

    Ok(Json(RunningInstancesResponse {
        server_id: id,
        container_id: query.container_id,
        page: query.page,
        page_size: query.page_size,
        data,
    }))
}

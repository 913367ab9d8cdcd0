use super::handlers::{health, migration, plan, server};
use super::middleware::cors::add_cors;
use crate::services::{JobScheduler, MigrationService, PlanService, ServerRegistry};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub migration_service: MigrationService,
    pub plan_service: PlanService,
    pub registry: Arc<ServerRegistry>,
    pub scheduler: JobScheduler,
}

pub fn create_router(
    migration_service: MigrationService,
    plan_service: PlanService,
    registry: Arc<ServerRegistry>,
    scheduler: JobScheduler,
) -> Router {
    let state = AppState {
        migration_service,
        plan_service,
        registry,
        scheduler,
    };

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Migrations
        .route(
            "/api/migrations",
            post(migration::submit_migration).get(migration::list_migrations),
        )
        .route(
            "/api/migrations/{id}",
            get(migration::get_migration)
                .put(migration::reschedule_migration)
                .delete(migration::cancel_migration),
        )
        .route("/api/migrations/{id}/results", get(migration::get_results))
        .route(
            "/api/migrations/{id}/results/{report_id}",
            get(migration::get_report),
        )
        // Plans
        .route("/api/plans", post(plan::create_plan).get(plan::list_plans))
        .route("/api/plans/{id}", get(plan::get_plan))
        // Servers
        .route("/api/kieservers", get(server::list_servers))
        .route(
            "/api/kieservers/{id}/containers",
            get(server::list_containers),
        )
        .route(
            "/api/kieservers/{id}/definitions",
            get(server::list_definitions),
        )
        .route(
            "/api/kieservers/{id}/instances",
            get(server::list_running_instances),
        )
        .with_state(state);

    add_cors(api_routes)
}

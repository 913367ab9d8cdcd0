pub mod migration_service;
pub mod plan_service;
pub mod scheduler_service;
pub mod server_registry;

pub use migration_service::MigrationService;
pub use plan_service::PlanService;
pub use scheduler_service::{JobRunner, JobScheduler};
pub use server_registry::ServerRegistry;

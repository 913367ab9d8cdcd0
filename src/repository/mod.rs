pub mod connection;
pub mod migration_repository;
pub mod plan_repository;

pub use connection::establish_connection;
pub use migration_repository::MigrationRepository;
pub use plan_repository::PlanRepository;

pub type DbPool = sqlx::SqlitePool;

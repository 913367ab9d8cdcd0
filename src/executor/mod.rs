pub mod migration_executor;

pub use migration_executor::MigrationExecutor;

pub mod migration;
pub mod plan;
pub mod report;
pub mod server;

pub use migration::{ExecutionSpec, ExecutionType, Migration, MigrationDefinition, MigrationStatus};
pub use plan::{Plan, ProcessRef};
pub use report::MigrationReport;
pub use server::{ClientCertificate, Credentials, ServerAuth, ServerConfig, ServerIdentity};

pub mod health;
pub mod migration;
pub mod plan;
pub mod server;

use crate::repository::DbPool;
use anyhow::Result;

pub async fn establish_connection(database_url: &str) -> Result<DbPool> {
    // Ensure the database URL has the correct format
    let db_url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{}", database_url)
    };

    // Create connection with create_if_missing option
    let connection_string = format!("{}?mode=rwc", db_url);
    let pool = sqlx::SqlitePool::connect(&connection_string).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plans (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            source_container_id TEXT NOT NULL,
            source_process_id TEXT NOT NULL,
            target_container_id TEXT NOT NULL,
            target_process_id TEXT NOT NULL,
            mappings TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS migrations (
            id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL,
            server_id TEXT NOT NULL,
            process_instance_ids TEXT,
            execution_type INTEGER NOT NULL,
            scheduled_start_time TEXT,
            callback_url TEXT,
            requester TEXT,
            status INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT,
            cancelled_at TEXT,
            error_message TEXT
        );

        CREATE TABLE IF NOT EXISTS migration_reports (
            id TEXT PRIMARY KEY,
            migration_id TEXT NOT NULL,
            process_instance_id INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            successful BOOLEAN NOT NULL,
            logs TEXT NOT NULL,
            FOREIGN KEY (migration_id) REFERENCES migrations(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_migrations_status ON migrations(status);
        CREATE INDEX IF NOT EXISTS idx_migrations_plan_id ON migrations(plan_id);
        CREATE INDEX IF NOT EXISTS idx_migration_reports_migration_id ON migration_reports(migration_id);
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

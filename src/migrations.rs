//! Database migrations using sqlx built-in migration system.
//!
//! Migrations are stored in the `migrations/` directory.
//! Each migration file is named `NNNN_description.sql`.

use sqlx::SqlitePool;
use sqlx::migrate::Migrator;

use crate::errors::BotResult;

// Embed migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run all pending migrations using sqlx migrate
pub async fn run_migrations(pool: &SqlitePool) -> BotResult<()> {
    if !table_exists(pool, "converted_media").await {
        log::info!("Fresh database, creating conversion cache table");
    }

    MIGRATOR.run(pool).await?;

    log::info!("Database migrations completed successfully");
    Ok(())
}

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
    let result = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
    )
    .bind(table)
    .fetch_one(pool)
    .await;

    matches!(result, Ok(count) if count > 0)
}

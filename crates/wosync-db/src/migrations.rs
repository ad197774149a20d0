//! Database migration management.
//!
//! Embeds SQL migrations and provides functions to apply them automatically.
//! Uses `SQLx`'s built-in migration support with compile-time embedding.

use crate::error::{DatabaseError, Result};
use sqlx::AnyPool;

/// Run all pending database migrations.
///
/// This function applies all migrations in the `migrations/` directory that
/// haven't been applied yet. `SQLx` tracks applied migrations in a
/// `_sqlx_migrations` table, so running it again is a no-op.
///
/// # Errors
/// Returns `DatabaseError::Migration` if any migration fails to execute.
pub async fn run_migrations(pool: &AnyPool) -> Result<()> {
    tracing::debug!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration execution failed: {e}")))?;

    tracing::debug!("Database migrations completed");
    Ok(())
}

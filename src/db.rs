//! Database module
//!
//! Connectivity and schema checks. The schema itself lives in `migrations/`.

use sqlx::PgPool;

/// Tables the store and the event pipeline write to
pub const REQUIRED_TABLES: &[&str] = &[
    "members",
    "posts",
    "comments",
    "post_hearts",
    "follows",
    "friendships",
    "collections",
    "collection_posts",
    "event_outbox",
    "processed_events",
    "dead_letters",
];

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(*table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    tracing::info!(tables = REQUIRED_TABLES.len(), "Database schema verified");
    Ok(true)
}

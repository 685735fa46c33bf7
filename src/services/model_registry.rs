//! The Configured Model table (§3, §4.7). Seeded once at startup from
//! the config fallback chain; no admin CRUD exists for it (the CRUD
//! surface that would normally own this table is out of scope).

use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::models::configured_model::ConfiguredModel;

/// Seed the `models` table from `Config::fallback_models`, the same way
/// the teacher's `warm_up_model_routes` pre-populates its routing cache
/// at startup — here via `INSERT ... ON CONFLICT DO NOTHING` against
/// Postgres instead of Redis.
pub async fn seed_from_config(db: &PgPool, config: &Config) -> Result<(), AppError> {
    let ids = config.fallback_models();
    if ids.is_empty() {
        tracing::info!("No fallback models configured; models table left as-is");
        return Ok(());
    }

    for id in &ids {
        sqlx::query("INSERT INTO models (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .execute(db)
            .await?;
    }

    tracing::info!("Seeded {} configured model(s)", ids.len());
    Ok(())
}

pub async fn list(db: &PgPool) -> Result<Vec<ConfiguredModel>, AppError> {
    let rows = sqlx::query_as::<_, ConfiguredModel>("SELECT id FROM models ORDER BY id")
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn get(db: &PgPool, id: &str) -> Result<Option<ConfiguredModel>, AppError> {
    let row = sqlx::query_as::<_, ConfiguredModel>("SELECT id FROM models WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

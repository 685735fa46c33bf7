use serde::Serialize;
use sqlx::FromRow;

/// A row of the `models` table (§3, §4.7). The set is seeded once at
/// startup from the configured fallback chain; there is no admin CRUD for
/// it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConfiguredModel {
    pub id: String,
}

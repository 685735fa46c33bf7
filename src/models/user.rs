use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A caller the OIDC flow (out of scope here) would normally create. Rows
/// are created lazily the first time an owner id is used to issue a key.
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Full DB row for an Issued Key (§3). `bearer_hash` is never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct IssuedKey {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub bearer_hash: String,
    pub backend_tag: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Response when listing keys — never exposes the hash.
#[derive(Debug, Serialize)]
pub struct IssuedKeyInfo {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub backend_tag: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<IssuedKey> for IssuedKeyInfo {
    fn from(k: IssuedKey) -> Self {
        Self {
            id: k.id,
            owner_id: k.owner_id,
            backend_tag: k.backend_tag,
            description: k.description,
            created_at: k.created_at,
        }
    }
}

/// Response when creating a key — includes the plaintext secret, shown
/// only once per §3's "Issued Key" lifecycle.
#[derive(Debug, Serialize)]
pub struct IssuedKeyCreated {
    pub id: Uuid,
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

//! A thin `/admin/keys` surface, gated by `ADMIN_KEY` (§6), so Issued
//! Keys have a way to come into existence. No provider/model CRUD:
//! backends are configuration, not DB rows, and the Configured Model
//! table is seeded from config (§4.7), not administered here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::issued_key::{IssuedKeyCreated, IssuedKeyInfo};
use crate::services::credential_store;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub owner_id: Uuid,
    pub owner_name: String,
    pub backend_tag: Option<String>,
    pub description: Option<String>,
}

/// POST /admin/keys — issue a new key for `owner_id` (§4.2 `insert`).
async fn create_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<IssuedKeyCreated>), AppError> {
    if body.owner_name.trim().is_empty() {
        return Err(AppError::BadRequest("owner_name is required".into()));
    }

    let created = credential_store::insert(
        &state.db,
        body.owner_id,
        &body.owner_name,
        body.backend_tag,
        body.description,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    pub owner_id: Uuid,
}

/// GET /admin/keys?owner_id=... — list an owner's keys without hashes.
async fn list_keys(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<Vec<IssuedKeyInfo>>, AppError> {
    let keys = credential_store::list(&state.db, query.owner_id).await?;
    Ok(Json(keys))
}

#[derive(Debug, Deserialize)]
pub struct DeleteKeyQuery {
    pub owner_id: Uuid,
}

/// DELETE /admin/keys/{id}?owner_id=... — §4.2 `delete`, only succeeds
/// when the owner matches.
async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteKeyQuery>,
) -> Result<StatusCode, AppError> {
    credential_store::delete(&state.db, id, query.owner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/keys", post(create_key).get(list_keys))
        .route("/keys/{id}", delete(delete_key))
}

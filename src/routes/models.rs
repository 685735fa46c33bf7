//! The Models Endpoint (§4.7): synthesizes an OpenAI-shape listing from
//! the Configured Model table, bypassing the proxy path entirely.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::error::AppError;
use crate::services::model_registry;
use crate::state::AppState;

fn not_found_body() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "message": "model not found",
                "type": "invalid_request_error",
                "code": "model_not_found",
            }
        })),
    )
        .into_response()
}

async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let models = model_registry::list(&state.db).await?;
    let now = chrono::Utc::now().timestamp();
    let owned_by = &state.config.models_owner;

    let data: Vec<_> = models
        .into_iter()
        .map(|m| json!({"id": m.id, "object": "model", "created": now, "owned_by": owned_by}))
        .collect();

    Ok(Json(json!({"object": "list", "data": data})))
}

async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let model = model_registry::get(&state.db, &id)
        .await
        .map_err(IntoResponse::into_response)?;

    let Some(model) = model else {
        return Err(not_found_body());
    };

    let now = chrono::Utc::now().timestamp();
    Ok(Json(json!({
        "id": model.id,
        "object": "model",
        "created": now,
        "owned_by": state.config.models_owner,
    }))
    .into_response())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/models", get(list_models))
        .route("/models/{id}", get(get_model))
        .route("/v1/models", get(list_models))
        .route("/v1/models/{id}", get(get_model))
}

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::credential_store;
use crate::state::AppState;

/// Identity of the authenticated caller, injected into request
/// extensions by `user_key_auth` (§4.1 step 2).
#[derive(Debug, Clone, Copy)]
pub struct KeyIdentity {
    pub key_id: Uuid,
}

fn extract_bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Gates `/admin/*` behind the `ADMIN_KEY` shared secret (§6).
pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer(&req) {
        Some(t) => t,
        None => return AppError::TokenEmpty.into_response(),
    };

    if token != state.config.admin_key {
        return AppError::AdminOnly.into_response();
    }

    next.run(req).await
}

/// §4.1 step 2 — authenticates a caller against the Credential Store and
/// installs `KeyIdentity` for downstream handlers.
pub async fn user_key_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer(&req) {
        Some(t) => t.to_string(),
        None => return AppError::TokenEmpty.into_response(),
    };

    match credential_store::lookup(&state.db, &token).await {
        Ok(Some(key_id)) => {
            let mut req = req;
            req.extensions_mut().insert(KeyIdentity { key_id });
            next.run(req).await
        }
        Ok(None) => AppError::TokenInvalid.into_response(),
        Err(e) => {
            tracing::error!("key lookup error: {}", e);
            AppError::Internal("key lookup failed".into()).into_response()
        }
    }
}

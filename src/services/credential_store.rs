//! Owns hashed bearer-token records (§4.2). Lookup is an O(N)
//! constant-time-verify scan; the Redis fast path the teacher used for
//! its deterministic SHA-256 hashes does not apply to a salted Argon2
//! hash, so it is not carried over (see DESIGN.md).

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::issued_key::{IssuedKey, IssuedKeyCreated, IssuedKeyInfo};

/// Generate a new plaintext secret in the format `sk-{uuid v4}`.
pub fn generate_secret() -> String {
    format!("sk-{}", Uuid::new_v4())
}

fn hash_secret(plain: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

fn verify_secret(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok()
}

/// `insert(owner, secret_plain) → key_id` (§4.2). Ensures a `users` row
/// exists for `owner_id`, creating a minimal placeholder on first sight
/// (there is no OIDC flow here to have created one already).
pub async fn insert(
    db: &PgPool,
    owner_id: Uuid,
    owner_name: &str,
    backend_tag: Option<String>,
    description: Option<String>,
) -> Result<IssuedKeyCreated, AppError> {
    let mut tx = db.begin().await?;

    sqlx::query(
        r#"INSERT INTO users (id, name, is_admin, created_at)
           VALUES ($1, $2, FALSE, NOW())
           ON CONFLICT (id) DO NOTHING"#,
    )
    .bind(owner_id)
    .bind(owner_name)
    .execute(&mut *tx)
    .await?;

    let id = Uuid::new_v4();
    let secret = generate_secret();
    let hash = hash_secret(&secret)?;
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO api_keys (id, owner_id, bearer_hash, backend_tag, description, created_at)
           VALUES ($1, $2, $3, $4, $5, $6)"#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(&hash)
    .bind(&backend_tag)
    .bind(&description)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(IssuedKeyCreated { id, secret, created_at: now })
}

/// `lookup(secret_plain) → key_id | ∅` (§4.2). O(N) candidate-hash verify
/// loop using Argon2's own constant-time comparator.
pub async fn lookup(db: &PgPool, secret_plain: &str) -> Result<Option<Uuid>, AppError> {
    let candidates: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT id, bearer_hash FROM api_keys")
            .fetch_all(db)
            .await?;

    for (id, hash) in candidates {
        if verify_secret(secret_plain, &hash) {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// `delete(key_id, owner)` (§4.2) — only removes the key when the owner
/// matches, preventing cross-owner deletion.
pub async fn delete(db: &PgPool, key_id: Uuid, owner: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND owner_id = $2")
        .bind(key_id)
        .bind(owner)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub async fn list(db: &PgPool, owner: Uuid) -> Result<Vec<IssuedKeyInfo>, AppError> {
    let keys: Vec<IssuedKey> =
        sqlx::query_as("SELECT * FROM api_keys WHERE owner_id = $1 ORDER BY created_at DESC")
            .bind(owner)
            .fetch_all(db)
            .await?;

    Ok(keys.into_iter().map(IssuedKeyInfo::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_salted_and_verifies() {
        let hash = hash_secret("sk-test-secret").unwrap();
        assert!(verify_secret("sk-test-secret", &hash));
        assert!(!verify_secret("sk-wrong", &hash));
    }

    #[test]
    fn same_secret_hashes_differently_each_time() {
        let a = hash_secret("sk-same").unwrap();
        let b = hash_secret("sk-same").unwrap();
        assert_ne!(a, b);
    }
}

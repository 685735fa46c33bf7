//! Pure functions mapping a free-form upstream `usage` object to a
//! normalized `{input, cached, output, total}` tuple, plus the model
//! identifier splitter. No I/O; everything here operates on
//! `serde_json::Value`.

use std::collections::HashMap;

use serde_json::Value;

/// Flattened integer fields (`totals`) and one-level-deep sub-objects
/// (`details`) found in a decoded `usage` object.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UsageShape {
    pub totals: HashMap<String, i64>,
    pub details: HashMap<String, HashMap<String, i64>>,
}

fn as_rounded_int(v: &Value) -> Option<i64> {
    if let Some(i) = v.as_i64() {
        return Some(i);
    }
    v.as_f64().map(|f| f.trunc() as i64)
}

/// §4.4.1 — extract totals and one-level-deep detail sub-objects from a
/// decoded `usage` object.
pub fn extract_totals_and_details(usage: &Value) -> UsageShape {
    let mut shape = UsageShape::default();
    let Some(map) = usage.as_object() else {
        return shape;
    };

    for (key, value) in map {
        if let Some(n) = as_rounded_int(value) {
            shape.totals.insert(key.clone(), n);
            continue;
        }
        if let Some(sub) = value.as_object() {
            let mut sub_map = HashMap::new();
            for (sub_key, sub_value) in sub {
                if let Some(n) = as_rounded_int(sub_value) {
                    sub_map.insert(sub_key.clone(), n);
                }
            }
            shape.details.insert(key.clone(), sub_map);
        }
    }

    shape
}

/// Normalized `{input, cached, output, total}` token counts (§4.4.2).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TokenCounts {
    pub input: i64,
    pub cached: i64,
    pub output: i64,
    pub total: i64,
}

const INPUT_ALIASES: &[&str] = &["prompt_tokens", "input_tokens", "prompt"];
const OUTPUT_ALIASES: &[&str] = &["completion_tokens", "output_tokens", "completion", "output"];
const TOTAL_ALIASES: &[&str] = &["total_tokens", "total"];
const CACHED_DETAIL_KEYS: &[&str] = &["prompt_tokens_details", "input_tokens_details"];

fn first_hit(totals: &HashMap<String, i64>, aliases: &[&str]) -> i64 {
    for alias in aliases {
        if let Some(v) = totals.get(*alias) {
            return *v;
        }
    }
    0
}

fn find_cached(shape: &UsageShape) -> i64 {
    for key in CACHED_DETAIL_KEYS {
        if let Some(sub) = shape.details.get(*key) {
            if let Some(v) = sub.get("cached_tokens") {
                return *v;
            }
        }
    }
    for sub in shape.details.values() {
        if let Some(v) = sub.get("cached_tokens") {
            return *v;
        }
    }
    if let Some(v) = shape.totals.get("cached_tokens") {
        return *v;
    }
    0
}

/// §4.4.2 — alias resolution, derivation rules, and the cached/input
/// invariant. `extractTokenCounts` in spec terms.
pub fn normalize(usage: &Value) -> TokenCounts {
    let shape = extract_totals_and_details(usage);

    let mut input = first_hit(&shape.totals, INPUT_ALIASES);
    let mut output = first_hit(&shape.totals, OUTPUT_ALIASES);
    let mut total = first_hit(&shape.totals, TOTAL_ALIASES);
    let cached = find_cached(&shape).max(0);

    if output == 0 && total > 0 && input > 0 {
        output = total - input;
    }
    if input == 0 && total > 0 && output > 0 {
        input = total - output;
    }
    if total == 0 {
        total = input + output;
    }

    let cached = cached.min(input.max(0));

    TokenCounts {
        input: input.max(0),
        cached,
        output: output.max(0),
        total: total.max(0),
    }
}

/// The non-cached billable prompt-token count, `max(0, input - cached)`.
pub fn billable_input(counts: &TokenCounts) -> i64 {
    (counts.input - counts.cached).max(0)
}

/// §4.4.3 — split a model identifier into `(alias, snapshot_date)`.
/// `"gpt-4-2024-05-13"` → `("gpt-4", "2024-05-13")`; anything without a
/// trailing `-YYYY-MM-DD` suffix returns an empty snapshot.
pub fn split_model_snapshot(model: &str) -> (String, String) {
    let bytes = model.as_bytes();
    if bytes.len() < 11 {
        return (model.to_string(), String::new());
    }
    let tail = &model[model.len() - 10..];
    let looks_like_date = tail.len() == 10
        && tail.as_bytes()[4] == b'-'
        && tail.as_bytes()[7] == b'-'
        && tail[0..4].bytes().all(|b| b.is_ascii_digit())
        && tail[5..7].bytes().all(|b| b.is_ascii_digit())
        && tail[8..10].bytes().all(|b| b.is_ascii_digit());

    if !looks_like_date {
        return (model.to_string(), String::new());
    }
    let Some(prefix) = model[..model.len() - 10].strip_suffix('-') else {
        return (model.to_string(), String::new());
    };
    (prefix.to_string(), tail.to_string())
}

/// `join(split(m)) == m` — the inverse of `split_model_snapshot`.
pub fn join_model_snapshot(alias: &str, snapshot: &str) -> String {
    if snapshot.is_empty() {
        alias.to_string()
    } else {
        format!("{alias}-{snapshot}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn s1_unary_chat_completion() {
        let usage = json!({"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30});
        let counts = normalize(&usage);
        assert_eq!(counts, TokenCounts { input: 10, cached: 0, output: 20, total: 30 });
    }

    #[test]
    fn s2_responses_api_shape() {
        let usage = json!({
            "input_tokens": 100,
            "output_tokens": 40,
            "input_tokens_details": {"cached_tokens": 25}
        });
        let counts = normalize(&usage);
        assert_eq!(counts, TokenCounts { input: 100, cached: 25, output: 40, total: 140 });
    }

    #[test]
    fn derives_output_from_total_and_input() {
        let usage = json!({"prompt_tokens": 10, "total_tokens": 30});
        let counts = normalize(&usage);
        assert_eq!(counts.output, 20);
    }

    #[test]
    fn derives_input_from_total_and_output() {
        let usage = json!({"completion_tokens": 20, "total_tokens": 30});
        let counts = normalize(&usage);
        assert_eq!(counts.input, 10);
    }

    #[test]
    fn cached_never_exceeds_input() {
        let usage = json!({"prompt_tokens": 5, "prompt_tokens_details": {"cached_tokens": 999}});
        let counts = normalize(&usage);
        assert!(counts.cached <= counts.input);
    }

    #[test]
    fn floats_round_toward_zero() {
        let usage = json!({"prompt_tokens": 10.9, "completion_tokens": 20.1});
        let counts = normalize(&usage);
        assert_eq!(counts.input, 10);
        assert_eq!(counts.output, 20);
    }

    #[test]
    fn billable_input_subtracts_cache() {
        let counts = TokenCounts { input: 100, cached: 25, output: 40, total: 140 };
        assert_eq!(billable_input(&counts), 75);
    }

    #[test]
    fn split_model_snapshot_known_case() {
        assert_eq!(
            split_model_snapshot("gpt-4-2024-05-13"),
            ("gpt-4".to_string(), "2024-05-13".to_string())
        );
    }

    #[test]
    fn split_model_snapshot_no_date_suffix() {
        assert_eq!(
            split_model_snapshot("gpt-5-mini"),
            ("gpt-5-mini".to_string(), String::new())
        );
    }

    #[test]
    fn split_join_is_a_bijection() {
        for m in ["gpt-4-2024-05-13", "gpt-5-mini", "o1-preview-2024-09-12", "a"] {
            let (alias, snapshot) = split_model_snapshot(m);
            assert_eq!(join_model_snapshot(&alias, &snapshot), m);
        }
    }

    #[test]
    fn extract_token_counts_is_idempotent() {
        let usage = json!({"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30});
        let counts = normalize(&usage);
        let reprojected = json!({
            "prompt_tokens": counts.input,
            "completion_tokens": counts.output,
            "total_tokens": counts.total,
        });
        let counts2 = normalize(&reprojected);
        assert_eq!(counts, counts2);
    }
}

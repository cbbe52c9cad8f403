//! Bounded repair for sloppy JSON payloads returned by the inference service.
//!
//! The extraction model occasionally wraps its response in Markdown code
//! fences or leaves a trailing comma. One repair pass is attempted; a payload
//! that still fails to parse is the caller's problem (treated as no signal).

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("valid regex"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

/// Parse a JSON payload, applying one bounded repair pass on failure.
pub(crate) fn parse_with_repair(payload: &str) -> Result<Value> {
    match serde_json::from_str(payload) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let repaired = repair_payload(payload);
            serde_json::from_str(&repaired)
                .map_err(|_| first_error)
                .context("payload unparseable after repair")
        }
    }
}

/// Strip Markdown code fences and trailing commas.
fn repair_payload(payload: &str) -> String {
    let unfenced = match CODE_FENCE.captures(payload) {
        Some(captures) => captures
            .get(1)
            .map_or_else(|| payload.to_string(), |m| m.as_str().to_string()),
        None => payload.trim().to_string(),
    };

    TRAILING_COMMA.replace_all(&unfenced, "$1").into_owned()
}

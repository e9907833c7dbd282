//! Sentinel-delimited JSON payloads embedded in a container's output stream.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Line written immediately before the JSON payload.
pub const SIGNAL_START_MARKER: &str = "__SIGNAL_JSON_START__";
/// Line written immediately after the JSON payload.
pub const SIGNAL_END_MARKER: &str = "__SIGNAL_JSON_END__";

static PAYLOAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "(?s){}(.*?){}",
        regex::escape(SIGNAL_START_MARKER),
        regex::escape(SIGNAL_END_MARKER)
    ))
    .expect("marker pattern is a valid regex")
});

/// Errors raised while decoding a marked payload
#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("Payload between result markers is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Extract the JSON payload between the first start/end marker pair.
///
/// Returns `Ok(None)` when the output carries no marker pair at all.
pub fn extract_payload(output: &str) -> Result<Option<Value>, MarkerError> {
    let Some(captures) = PAYLOAD_RE.captures(output) else {
        return Ok(None);
    };
    let body = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    let value = serde_json::from_str(body)?;
    Ok(Some(value))
}

/// Wrap a JSON value in the marker pair, the way a sandboxed program emits it.
pub fn wrap_payload(value: &Value) -> String {
    format!("{}{}{}", SIGNAL_START_MARKER, value, SIGNAL_END_MARKER)
}

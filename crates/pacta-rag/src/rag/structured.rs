//! Best-effort extraction of structured JSON from raw generation output.
//!
//! Models wrap JSON in commentary, markdown fences, or emit literal control
//! characters inside string values. Every generation-stage contract goes
//! through [`parse_structured`] so those defects are absorbed in one place.

use serde::de::DeserializeOwned;

/// Slice out the first balanced JSON object in `text`, tolerant of leading
/// and trailing commentary. Returns `None` when no complete object exists.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let tail = &text[start..];

    let mut depth = 0u32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in tail.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&tail[..i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse raw model output into `T`. Tries the extracted object as-is first,
/// then retries with control characters stripped (models sometimes emit
/// literal newlines inside JSON string values, which strict parsers reject).
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let object = extract_json_object(raw)?;
    match serde_json::from_str(object) {
        Ok(value) => Some(value),
        Err(first_err) => {
            let cleaned: String = object.chars().filter(|c| !c.is_control()).collect();
            match serde_json::from_str(&cleaned) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::debug!(error = %first_err, "Structured output parse failed");
                    None
                }
            }
        }
    }
}

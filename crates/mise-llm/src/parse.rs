//! Strict decoding of JSON embedded in model output.
//!
//! Models wrap JSON in prose or Markdown fences, and web-search answers add
//! bracketed citations like `[1]` before the payload. [`json_candidates`]
//! lists every plausible value; [`decode`] takes the first one that
//! deserializes into the target type.

use serde::de::DeserializeOwned;

/// Balanced JSON values in `text`, in the order they are tried: the body of
/// a ```json fence first, then each top-level object or array by position.
pub fn json_candidates(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    if let Some(fenced) = fenced_json(text) {
        found.push(fenced);
    }

    let mut pos = 0;
    while let Some(rel) = text[pos..].find(|c: char| c == '{' || c == '[') {
        let start = pos + rel;
        match balanced_at(text, start) {
            Some(value) => {
                if !found.contains(&value) {
                    found.push(value);
                }
                pos = start + value.len();
            }
            None => pos = start + 1,
        }
    }
    found
}

/// Locate the preferred JSON value in `text`.
pub fn extract_json(text: &str) -> Option<&str> {
    json_candidates(text).into_iter().next()
}

fn fenced_json(text: &str) -> Option<&str> {
    let open = text.find("```json").or_else(|| text.find("```JSON"))?;
    let body_start = open + "```json".len();
    let body_end = text[body_start..]
        .find("```")
        .map_or(text.len(), |rel| body_start + rel);
    let body = &text[body_start..body_end];
    let rel = body.find(|c: char| c == '{' || c == '[')?;
    balanced_at(body, rel)
}

/// The balanced value opening at byte `start`, which must be `{` or `[`.
fn balanced_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode the JSON payload of a model response into `T`. When nothing
/// decodes, the error describes the first candidate.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let mut first_error = None;
    for json in json_candidates(text) {
        match serde_json::from_str(json) {
            Ok(value) => return Ok(value),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(format!("{} in {}", e, preview(json, 120)));
                }
            }
        }
    }
    Err(first_error.unwrap_or_else(|| {
        format!("no JSON found in model output: {}", preview(text, 120))
    }))
}

fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

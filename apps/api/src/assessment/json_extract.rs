use serde::de::DeserializeOwned;

use crate::assessment::EngineError;
use crate::llm_client::strip_json_fences;

/// Returns the first balanced `{...}` span in `text`, skipping braces that
/// appear inside JSON string literals.
///
/// Known limitation: a brace-delimited fragment in prose *before* the real
/// payload is returned instead of the payload, and then fails to deserialize.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Locates the model's JSON object and validates it against `T`.
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, EngineError> {
    let candidate = first_json_object(strip_json_fences(text))
        .ok_or_else(|| EngineError::UnparsableResponse("Could not parse JSON from response".into()))?;
    serde_json::from_str(candidate).map_err(|e| {
        EngineError::UnparsableResponse(format!("Response did not match the expected shape: {e}"))
    })
}

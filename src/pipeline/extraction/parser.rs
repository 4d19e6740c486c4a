//! Raw-response handling — pull the JSON payload out of whatever the
//! extraction service wrapped it in (markdown fences, prose preamble).

use super::ExtractionError;

/// Extract the JSON object from a raw service response.
///
/// Tries, in order: a fenced ```json block, any fenced block, then the
/// outermost brace pair. Fails with `MalformedResponse` when no candidate
/// object is found at all.
pub fn extract_json_payload(response: &str) -> Result<String, ExtractionError> {
    let trimmed = response.trim();

    if let Some(fenced) = extract_fenced_block(trimmed) {
        return Ok(fenced);
    }

    // No fence: take the outermost { ... } span
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => Ok(trimmed[s..=e].to_string()),
        _ => Err(ExtractionError::MalformedResponse(
            "no JSON object found in response".into(),
        )),
    }
}

/// Pull the content of a ```json (or bare ```) fence, if present.
fn extract_fenced_block(text: &str) -> Option<String> {
    let open = text.find("```json").map(|p| p + 7).or_else(|| {
        text.find("```").map(|p| p + 3)
    })?;

    let close = text[open..].find("```")?;
    let content = text[open..open + close].trim();
    if content.is_empty() {
        return None;
    }
    Some(content.to_string())
}

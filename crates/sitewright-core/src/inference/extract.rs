//! Payload extraction from free-form model output.

use serde_json::Value;

use crate::inference::error::InferenceError;

/// Remove Markdown code-fence wrapping.
///
/// Text that starts with a fence loses the opening line (including any
/// language tag) and the closing fence. Text with a fenced block somewhere
/// inside yields that first block's contents. Anything else is returned
/// trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };

    let after_open = &trimmed[open + 3..];
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];

    let inner = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };

    if open > 0 && inner.trim().is_empty() {
        return trimmed.to_string();
    }

    inner.trim().to_string()
}

/// Parse the outermost JSON object in `text`.
///
/// Tries the span from the first `{` to the last `}`, then the whole text.
pub fn extract_json(text: &str) -> Result<Value, InferenceError> {
    let cleaned = strip_code_fences(text);

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                return Ok(value);
            }
        }
    }

    serde_json::from_str::<Value>(&cleaned)
        .map_err(|e| InferenceError::extraction("json", e.to_string(), text))
}

/// Root elements that mark text as HTML.
const HTML_MARKERS: [&str; 6] = ["<!doctype html", "<html", "<body", "<main", "<section", "<div"];

/// Verify that `text` contains a recognisable HTML root element and return
/// it without code fences.
pub fn extract_html(text: &str) -> Result<String, InferenceError> {
    let cleaned = strip_code_fences(text);
    let lower = cleaned.to_ascii_lowercase();
    if HTML_MARKERS.iter().any(|m| lower.contains(m)) {
        Ok(cleaned)
    } else {
        Err(InferenceError::extraction(
            "html",
            "no recognisable root element",
            text,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_with_language_tag() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fences_embedded_block() {
        let text = "Here you go:\n```html\n<main>x</main>\n```\nEnjoy!";
        assert_eq!(strip_code_fences(text), "<main>x</main>");
    }

    #[test]
    fn test_strip_fences_plain_text_untouched() {
        assert_eq!(strip_code_fences("  <main>x</main> "), "<main>x</main>");
    }

    #[test]
    fn test_extract_json_outermost_object() {
        let text = "Sure! {\"site_name\": \"A\", \"pages\": [{\"slug\": \"index\"}]} Thanks";
        let value = extract_json(text).unwrap();
        assert_eq!(value["site_name"], "A");
        assert_eq!(value["pages"][0]["slug"], "index");
    }

    #[test]
    fn test_extract_json_falls_back_to_whole_text() {
        let value = extract_json("[1, 2]").unwrap();
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_extract_json_error_contains_excerpt() {
        let err = extract_json("I am not JSON at all").unwrap_err();
        assert!(err.to_string().contains("I am not JSON"));
    }

    #[test]
    fn test_extract_html() {
        assert!(extract_html("```html\n<main>hi</main>\n```").is_ok());
        assert!(extract_html("<!DOCTYPE html><html></html>").is_ok());
        let err = extract_html("Sorry, I cannot do that.").unwrap_err();
        assert!(err.to_string().contains("Sorry"));
    }
}

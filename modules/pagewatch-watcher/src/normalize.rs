/// Reduce a snapshot's raw content to canonical plain text.
///
/// The scraper stores either a JSON object with the extracted article text
/// under `textContent`, or (for older captures and fallback paths) the page
/// text itself. A parse failure is the expected fallback, not an error:
/// the whole string is returned unchanged.
pub fn normalize_content(content: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => value
            .get("textContent")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        Err(_) => content.to_string(),
    }
}

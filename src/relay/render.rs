//! Wire formats for relayed events.
//!
//! Helper output is untrusted, so every renderer escapes for the context the
//! text lands in:
//! - markup (page preamble): [`escape_html`]
//! - inline `<script>` JSON: [`script_safe_json`]

use super::event::UiEvent;
use super::invocation::Invocation;
use crate::errors::RelayError;

const REVIEW_PAGE: &str = include_str!("../../assets/review_page.html");

/// Turns events into the chunks written to the client.
pub trait Renderer: Send {
    fn content_type(&self) -> &'static str;

    /// Chunk sent once, before any event.
    fn preamble(&self) -> Option<String> {
        None
    }

    fn render(&self, event: &UiEvent) -> Result<String, RelayError>;
}

/// Progressive HTML page: a static preamble, then one `<script>` per event.
pub struct HtmlRenderer {
    pr: String,
    repo: String,
}

impl HtmlRenderer {
    pub fn new(invocation: &Invocation) -> Self {
        Self {
            pr: invocation.pr().to_string(),
            repo: invocation.repo().to_string(),
        }
    }
}

impl Renderer for HtmlRenderer {
    fn content_type(&self) -> &'static str {
        "text/html; charset=utf-8"
    }

    fn preamble(&self) -> Option<String> {
        Some(
            REVIEW_PAGE
                .replace("{{pr}}", &escape_html(&self.pr))
                .replace("{{repo}}", &escape_html(&self.repo)),
        )
    }

    fn render(&self, event: &UiEvent) -> Result<String, RelayError> {
        let json = script_safe_json(event)?;
        Ok(format!("<script>relayApply({});</script>\n", json))
    }
}

/// One JSON object per line, for programmatic clients.
pub struct NdjsonRenderer;

impl Renderer for NdjsonRenderer {
    fn content_type(&self) -> &'static str {
        "application/x-ndjson"
    }

    fn render(&self, event: &UiEvent) -> Result<String, RelayError> {
        let mut line = serde_json::to_string(event).map_err(RelayError::Render)?;
        line.push('\n');
        Ok(line)
    }
}

/// Escape text for an HTML text node or quoted attribute value.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Serialize to JSON that can sit inside a `<script>` element.
///
/// `<`, `>` and `&` only occur inside JSON strings, so replacing them with
/// `\u` escapes keeps the document valid JSON with the same value while
/// making `</script>` and `<!--` impossible. U+2028/U+2029 are escaped for
/// pre-ES2019 engines.
pub fn script_safe_json<T: serde::Serialize>(value: &T) -> Result<String, RelayError> {
    let json = serde_json::to_string(value).map_err(RelayError::Render)?;
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    Ok(out)
}

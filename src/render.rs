//! Content-type aware rendering of captured payloads.
//!
//! [`PayloadRenderer`] decides how a buffered body shows up in a log record:
//! parsed JSON, plain text, or a short placeholder that names the content type
//! instead of dumping binary or oversized content into the logs.

use std::fmt;

use serde_json::Value;

use crate::error::RenderError;

/// Content types whose bodies are never copied into a log record.
const NON_RENDERABLE_TYPES: &[&str] = &[
    "application/pdf",
    "application/octet-stream",
    "multipart/form-data",
    "multipart/mixed",
    "multipart/related",
    "application/cbor",
    "application/x-www-form-urlencoded",
    "image/gif",
    "image/jpeg",
    "image/png",
    "text/event-stream",
];

/// How a captured body is represented in a log record.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedPayload {
    /// The body was empty or whitespace only.
    Empty,
    /// The body was declared as JSON and parsed.
    Structured(Value),
    /// The body as plain text.
    Text(String),
    /// A textual stand-in used instead of, or alongside, the body.
    Placeholder(String),
}

impl RenderedPayload {
    pub fn is_empty(&self) -> bool {
        matches!(self, RenderedPayload::Empty)
    }

    /// Converts the payload into the JSON value stored in a record.
    /// `Empty` has no value and is left out of the record.
    pub fn into_value(self) -> Option<Value> {
        match self {
            RenderedPayload::Empty => None,
            RenderedPayload::Structured(value) => Some(value),
            RenderedPayload::Text(text) | RenderedPayload::Placeholder(text) => {
                Some(Value::String(text))
            }
        }
    }
}

impl fmt::Display for RenderedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderedPayload::Empty => Ok(()),
            RenderedPayload::Structured(value) => write!(f, "{value}"),
            RenderedPayload::Text(text) | RenderedPayload::Placeholder(text) => f.write_str(text),
        }
    }
}

/// Renders buffered payloads, truncating anything longer than `max_payload_length`.
#[derive(Debug, Clone, Copy)]
pub struct PayloadRenderer {
    max_payload_length: usize,
}

impl PayloadRenderer {
    pub fn new(max_payload_length: usize) -> Self {
        Self { max_payload_length }
    }

    /// Renders a server-side request or response body.
    ///
    /// Length is measured in characters of the decoded text, and the truncated
    /// prefix is cut on a character boundary, so lengths at or around the limit
    /// never fail.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::MalformedJson`] when the content type declares JSON
    /// but the body does not parse.
    pub fn render(
        &self,
        content_type: Option<&str>,
        raw: &[u8],
    ) -> Result<RenderedPayload, RenderError> {
        let text = String::from_utf8_lossy(raw);
        if text.trim().is_empty() {
            return Ok(RenderedPayload::Empty);
        }

        let length = text.chars().count();
        if length > self.max_payload_length {
            let truncated: String = text.chars().take(self.max_payload_length).collect();
            return Ok(RenderedPayload::Placeholder(format!(
                "Payload length={length} but maxPayload={}. Please, increase max_payload_length. \
                 Truncated content: {truncated}",
                self.max_payload_length
            )));
        }

        let Some(content_type) = content_type.map(str::trim).filter(|ct| !ct.is_empty()) else {
            return Ok(RenderedPayload::Placeholder(format!(
                "Content-Type is not specified: {text}"
            )));
        };

        let essence = media_type_essence(content_type);
        if essence == "application/json" {
            let tree = serde_json::from_str(&text)?;
            return Ok(RenderedPayload::Structured(tree));
        }

        if NON_RENDERABLE_TYPES.contains(&essence.as_str()) {
            Ok(RenderedPayload::Placeholder(format!(
                "Content-Type is {content_type}"
            )))
        } else {
            Ok(RenderedPayload::Placeholder(format!(
                "Content-Type is {content_type}. Content: {text}"
            )))
        }
    }

    /// Renders a response body received by an outbound client call.
    ///
    /// Here the limit applies to the byte length, and an oversized body is
    /// replaced entirely rather than truncated.
    pub fn render_client_body(&self, raw: &[u8]) -> RenderedPayload {
        if raw.len() > self.max_payload_length {
            RenderedPayload::Placeholder(format!(
                "Can't log payload: response body content length is {}",
                raw.len()
            ))
        } else {
            RenderedPayload::Text(String::from_utf8_lossy(raw).into_owned())
        }
    }
}

/// `type/subtype` part of a media type, lowercased and without parameters.
fn media_type_essence(content_type: &str) -> String {
    content_type
        .split_once(';')
        .map_or(content_type, |(essence, _)| essence)
        .trim()
        .to_ascii_lowercase()
}

//! Log record types and the per-exchange context handed to sinks.
//!
//! Records serialise to the wire shape consumed by log pipelines:
//!
//! ```text
//! {"requestInfo":{"uri":"/orders?id=1","httpMethod":"POST","headers":{...},"payload":{...}}}
//! {"responseInfo":{"uri":"/orders?id=1","httpStatus":200,"payload":{...}}}
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use http_body::Body as HttpBody;
use serde::Serialize;
use serde_json::Value;

/// Header names mapped to every value sent under that name.
pub type RecordHeaders = BTreeMap<String, Vec<String>>;

/// A structured record describing one side of an exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LogRecord {
    #[serde(rename = "requestInfo")]
    Request(RequestInfo),
    #[serde(rename = "responseInfo")]
    Response(ResponseInfo),
}

impl LogRecord {
    pub fn uri(&self) -> &str {
        match self {
            LogRecord::Request(info) => &info.uri,
            LogRecord::Response(info) => &info.uri,
        }
    }

    /// The rendered payload, if the record carries one.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            LogRecord::Request(info) => info.payload.as_ref(),
            LogRecord::Response(info) => info.payload.as_ref(),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Data logged when a request enters the middleware.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    /// Request URI including the query string
    pub uri: String,
    pub http_method: String,
    /// Request headers after the deny-list has been applied
    pub headers: RecordHeaders,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Data logged once a synchronous response has been produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub uri: String,
    pub http_status: u16,
    /// Response headers after the deny-list has been applied, omitted when none remain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<RecordHeaders>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Correlation values for one exchange, passed explicitly into every sink call.
///
/// A context lives exactly as long as the exchange it describes; nothing about
/// it is stored per thread or per worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeContext {
    pub uri: String,
    /// Time from the request entering the middleware to the response being ready
    pub duration: Option<Duration>,
    pub http_status: Option<StatusCode>,
}

impl ExchangeContext {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            duration: None,
            http_status: None,
        }
    }

    pub fn completed(mut self, duration: Duration, status: StatusCode) -> Self {
        self.duration = Some(duration);
        self.http_status = Some(status);
        self
    }
}

/// How the downstream handler finished producing its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// The body was fully materialised when the handler returned.
    Synchronous,
    /// The body is still being produced after the handler returned.
    Asynchronous,
}

impl CompletionMode {
    /// A body with an exact size is already complete; anything else is a
    /// stream that continues after the handler has returned.
    pub fn of<B: HttpBody>(body: &B) -> Self {
        if body.size_hint().exact().is_some() {
            CompletionMode::Synchronous
        } else {
            CompletionMode::Asynchronous
        }
    }
}

//! Default sink that writes records through `tracing`.
//!
//! [`LoggingHandler`] emits each record as one JSON line at `DEBUG` under the
//! `payload_logger` target, with the exchange context attached as fields.

use tracing::debug;

use crate::types::{ExchangeContext, LogRecord};
use crate::RecordSink;

/// Simple `tracing` implementation of [`RecordSink`].
///
/// # Examples
///
/// ```rust,no_run
/// use payload_logger::{LoggingHandler, PayloadLoggerConfig, PayloadLoggerLayer};
///
/// let layer = PayloadLoggerLayer::new(PayloadLoggerConfig::default(), LoggingHandler);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoggingHandler;

impl RecordSink for LoggingHandler {
    fn emit_request(&self, context: &ExchangeContext, record: &LogRecord) {
        debug!(target: "payload_logger", uri = %context.uri, "{record}");
    }

    fn emit_response(&self, context: &ExchangeContext, record: &LogRecord) {
        debug!(
            target: "payload_logger",
            uri = %context.uri,
            duration_ms = context.duration.map(|d| d.as_millis()),
            http_status = context.http_status.map(|s| s.as_u16()),
            "{record}"
        );
    }
}

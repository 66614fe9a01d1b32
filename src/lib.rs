//! # Payload Logger
//!
//! An Axum middleware that writes a structured record for every request and
//! response passing through a server, including a rendered view of the body,
//! while keeping the body intact for the handler and the client.
//!
//! ## Features
//!
//! - **Re-readable bodies**: request bodies are buffered once and handed on unchanged
//! - **Content-type aware payloads**: JSON is parsed, binary and form types are
//!   summarised, everything else is logged as text
//! - **Safe truncation**: payloads longer than the configured limit are cut on a
//!   character boundary and marked as truncated
//! - **Header redaction**: sensitive headers such as `Authorization` never reach the logs
//! - **Streaming responses**: bodies still being produced after the handler returns are
//!   delivered exactly once when the stream completes
//! - **Outbound calls**: [`ClientLoggerLayer`] logs requests made through a tower HTTP client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::post, Json, Router};
//! use payload_logger::{LoggingHandler, PayloadLoggerConfig, PayloadLoggerLayer};
//! use serde_json::Value;
//! use tower::ServiceBuilder;
//!
//! async fn echo(Json(body): Json<Value>) -> Json<Value> {
//!     Json(body)
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let layer = PayloadLoggerLayer::new(PayloadLoggerConfig::default(), LoggingHandler);
//!
//!     let app = Router::new()
//!         .route("/echo", post(echo))
//!         .layer(ServiceBuilder::new().layer(layer));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Custom Sinks
//!
//! Implement [`RecordSink`] to send records somewhere other than `tracing`:
//!
//! ```rust
//! use payload_logger::{ExchangeContext, LogRecord, RecordSink};
//!
//! #[derive(Debug)]
//! struct StdoutSink;
//!
//! impl RecordSink for StdoutSink {
//!     fn emit_request(&self, _context: &ExchangeContext, record: &LogRecord) {
//!         println!("{record}");
//!     }
//!
//!     fn emit_response(&self, context: &ExchangeContext, record: &LogRecord) {
//!         println!("{record} ({:?})", context.duration);
//!     }
//! }
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::response::Parts,
    response::Response,
};
use std::{
    collections::HashSet,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, error, instrument};

pub mod async_hook;
pub mod body_wrapper;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod headers;
pub mod logging_handler;
pub mod render;
pub mod types;

use async_hook::{AsyncCompletionHook, DeferredBody};
use body_wrapper::{buffer_request, drain, failed_body, CachingBody, ResponseBuffer};
pub use client::{ClientLoggerLayer, ClientLoggerService};
pub use config::PayloadLoggerConfig;
use exchange::Exchange;
pub use headers::HeaderFilter;
pub use logging_handler::LoggingHandler;
pub use render::{PayloadRenderer, RenderedPayload};
pub use types::{CompletionMode, ExchangeContext, LogRecord};

/// Destination for the records produced by the middleware.
///
/// Both methods are called on the task serving the exchange, before the
/// response is handed back, so implementations should be quick.
///
/// # Examples
///
/// ```rust
/// use payload_logger::{ExchangeContext, LogRecord, RecordSink};
/// use tracing::info;
///
/// #[derive(Debug)]
/// struct MySink;
///
/// impl RecordSink for MySink {
///     fn emit_request(&self, context: &ExchangeContext, record: &LogRecord) {
///         info!(uri = %context.uri, "{record}");
///     }
///
///     fn emit_response(&self, context: &ExchangeContext, record: &LogRecord) {
///         info!(uri = %context.uri, status = ?context.http_status, "{record}");
///     }
/// }
/// ```
pub trait RecordSink: Send + Sync + 'static {
    /// Called once the request has been buffered, before the handler runs.
    fn emit_request(&self, context: &ExchangeContext, record: &LogRecord);
    /// Called once a synchronous response has been produced. The context
    /// carries the elapsed time and the status code.
    fn emit_response(&self, context: &ExchangeContext, record: &LogRecord);
}

/// State shared by every service produced from one layer.
struct LoggerState {
    renderer: PayloadRenderer,
    header_filter: HeaderFilter,
    excluded_paths: HashSet<String>,
    sink: Arc<dyn RecordSink>,
}

impl LoggerState {
    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.contains(path)
    }

    fn log_request(&self, context: &ExchangeContext, exchange: &Exchange) {
        match exchange.request_record(&self.renderer, &self.header_filter) {
            Ok(record) => self.sink.emit_request(context, &record),
            Err(e) => error!(uri = %context.uri, error = %e, "Unable to build request message"),
        }
    }

    fn log_response(
        &self,
        context: &ExchangeContext,
        exchange: &Exchange,
        parts: &Parts,
        buffer: &ResponseBuffer,
    ) {
        let record = exchange.response_record(
            parts.status,
            &parts.headers,
            &buffer.content(),
            &self.renderer,
            &self.header_filter,
        );
        match record {
            Ok(record) => self.sink.emit_response(context, &record),
            Err(e) => error!(uri = %context.uri, error = %e, "Unable to build response message"),
        }
    }

    /// Logs and releases a response. Synchronous bodies are logged and
    /// flushed here; streaming bodies are handed to an [`AsyncCompletionHook`].
    async fn complete(&self, exchange: Exchange, response: Response) -> Response {
        let (parts, body) = response.into_parts();
        let context = exchange
            .context()
            .completed(exchange.elapsed(), parts.status);

        let buffer = Arc::new(ResponseBuffer::new());
        let body = CachingBody::new(body, buffer.clone());

        match CompletionMode::of(&body) {
            CompletionMode::Synchronous => {
                let body = match drain(body).await {
                    Ok(()) => {
                        self.log_response(&context, &exchange, &parts, &buffer);
                        Body::from(buffer.copy_body_to_response().unwrap_or_default())
                    }
                    Err(e) => {
                        error!(uri = %context.uri, error = %e, "Error buffering response body");
                        failed_body(e)
                    }
                };
                Response::from_parts(parts, body)
            }
            CompletionMode::Asynchronous => {
                debug!(uri = %context.uri, "Deferring response until the body stream completes");
                let hook = AsyncCompletionHook::new(buffer, context);
                Response::from_parts(parts, Body::new(DeferredBody::new(body, hook)))
            }
        }
    }
}

/// Tower layer for the payload logging middleware.
///
/// # Examples
///
/// ```rust,no_run
/// use payload_logger::{LoggingHandler, PayloadLoggerConfig, PayloadLoggerLayer};
/// use axum::{routing::get, Router};
/// use tower::ServiceBuilder;
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let config = PayloadLoggerConfig {
///     max_payload_length: 1024,
///     ..PayloadLoggerConfig::default()
/// };
/// let layer = PayloadLoggerLayer::new(config, LoggingHandler);
///
/// let app = Router::new()
///     .route("/hello", get(hello))
///     .layer(ServiceBuilder::new().layer(layer));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct PayloadLoggerLayer {
    state: Arc<LoggerState>,
}

impl PayloadLoggerLayer {
    /// Create a new layer that sends its records to `sink`.
    pub fn new<H: RecordSink>(config: PayloadLoggerConfig, sink: H) -> Self {
        Self {
            state: Arc::new(LoggerState {
                renderer: PayloadRenderer::new(config.max_payload_length),
                header_filter: HeaderFilter::new(&config.excluded_headers),
                excluded_paths: config.excluded_paths.into_iter().collect(),
                sink: Arc::new(sink),
            }),
        }
    }
}

impl<S> Layer<S> for PayloadLoggerLayer {
    type Service = PayloadLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PayloadLoggerService {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Tower service implementation for the payload logging middleware.
///
/// Users typically don't interact with this type directly - it's created by
/// [`PayloadLoggerLayer`].
#[derive(Clone)]
pub struct PayloadLoggerService<S> {
    inner: S,
    state: Arc<LoggerState>,
}

impl<S> Service<Request> for PayloadLoggerService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request) -> Self::Future {
        if self.state.is_excluded(request.uri().path()) {
            debug!(path = request.uri().path(), "Path excluded from payload logging");
            return Box::pin(self.inner.call(request));
        }

        // The ready service is the one that must handle this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = self.state.clone();

        Box::pin(async move {
            let (request, captured) = buffer_request(request).await;
            let exchange = match captured {
                Ok(body) => {
                    let exchange = Exchange::new(&request, body);
                    state.log_request(&exchange.context(), &exchange);
                    Some(exchange)
                }
                // Already logged; the handler sees the same failure.
                Err(_) => None,
            };

            let response = inner.call(request).await?;

            Ok(match exchange {
                Some(exchange) => state.complete(exchange, response).await,
                None => response,
            })
        })
    }
}

//! Logging for outbound HTTP calls.
//!
//! [`ClientLoggerLayer`] wraps any tower HTTP client service. It logs one line
//! before each call (method, URL, headers, request body) and one after
//! (elapsed time, status, headers, response body), and hands the caller a
//! response whose body has been buffered so it can still be read in full.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use axum::{
    body::{Body, Bytes},
    http::{Request, Response},
    BoxError,
};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use tower::{Layer, Service};
use tracing::{error, info};

use crate::body_wrapper::failed_body;
use crate::headers::{to_record_headers, HeaderFilter};
use crate::render::PayloadRenderer;

const EMPTY_BODY: &str = "empty-body";

/// Tower layer that logs requests sent through an HTTP client.
///
/// # Examples
///
/// ```rust
/// use axum::body::Body;
/// use axum::http::{Request, Response};
/// use payload_logger::ClientLoggerLayer;
/// use tower::{service_fn, Layer};
///
/// let client = service_fn(|_request: Request<Body>| async {
///     Ok::<_, std::convert::Infallible>(Response::new(Body::from("pong")))
/// });
/// let client = ClientLoggerLayer::new("billing", 5000).layer(client);
/// ```
#[derive(Clone)]
pub struct ClientLoggerLayer {
    state: Arc<ClientLoggerState>,
}

struct ClientLoggerState {
    tag: String,
    renderer: PayloadRenderer,
    header_filter: HeaderFilter,
}

impl ClientLoggerLayer {
    /// `client_name` prefixes every line this client logs.
    pub fn new(client_name: impl Into<String>, max_payload_length: usize) -> Self {
        Self {
            state: Arc::new(ClientLoggerState {
                tag: format!("[{}] ", client_name.into()),
                renderer: PayloadRenderer::new(max_payload_length),
                header_filter: HeaderFilter::default(),
            }),
        }
    }
}

impl<S> Layer<S> for ClientLoggerLayer {
    type Service = ClientLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientLoggerService {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Tower service created by [`ClientLoggerLayer`].
#[derive(Clone)]
pub struct ClientLoggerService<S> {
    inner: S,
    state: Arc<ClientLoggerState>,
}

impl<S, B> Service<Request<Body>> for ClientLoggerService<S>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = self.state.clone();

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let (body, logged_body) = match body.collect().await {
                Ok(collected) => {
                    let bytes = collected.to_bytes();
                    let logged = if bytes.is_empty() {
                        EMPTY_BODY.to_string()
                    } else {
                        String::from_utf8_lossy(&bytes).into_owned()
                    };
                    (Body::from(bytes), logged)
                }
                Err(e) => {
                    error!(uri = %parts.uri, error = %e, "Error while reading the client request");
                    (failed_body(e), EMPTY_BODY.to_string())
                }
            };

            info!(
                "{}Request URI: {}, Method: {}, Headers: {:?}, Request body: {}",
                state.tag,
                parts.uri,
                parts.method,
                to_record_headers(&state.header_filter.filter(&parts.headers)),
                logged_body
            );

            let started = Instant::now();
            let response = inner.call(Request::from_parts(parts, body)).await?;
            let elapsed = started.elapsed();

            let (parts, body) = response.into_parts();
            let (body, payload) = match body.collect().await {
                Ok(collected) => {
                    let bytes = collected.to_bytes();
                    let payload = state.renderer.render_client_body(&bytes).to_string();
                    (Body::from(bytes), payload)
                }
                Err(e) => {
                    let e: BoxError = e.into();
                    error!(
                        error = %e,
                        "Error while reading the client response"
                    );
                    (failed_body(axum::Error::new(e)), String::new())
                }
            };

            info!(
                "{}Response took [{}ms] Status code: {}, Headers: {:?}, Response body: {}",
                state.tag,
                elapsed.as_millis(),
                parts.status.as_u16(),
                to_record_headers(&state.header_filter.filter(&parts.headers)),
                payload
            );

            Ok(Response::from_parts(parts, body))
        })
    }
}

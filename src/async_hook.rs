//! Deferred delivery for responses that complete after the handler returns.
//!
//! When a handler hands back a streaming body, the exchange is still in flight
//! once the handler future resolves. The response is wrapped in
//! [`DeferredBody`], which stages the stream into a [`ResponseBuffer`] and
//! lets an [`AsyncCompletionHook`] release it to the client when the stream
//! ends.
//!
//! Nothing reaches the client before the stream ends, and the staged bytes
//! stay in memory until then. Long-lived streams such as server-sent event
//! feeds should be served from an excluded path.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::HeaderMap;
use http_body::{Body as HttpBody, Frame};
use tracing::{debug, error, trace};

use crate::body_wrapper::{CachingBody, ResponseBuffer};
use crate::types::ExchangeContext;

/// Callbacks for the lifecycle of an asynchronously completed exchange.
///
/// Bound to exactly one response buffer.
#[derive(Debug)]
pub struct AsyncCompletionHook {
    buffer: Arc<ResponseBuffer>,
    context: ExchangeContext,
}

impl AsyncCompletionHook {
    pub fn new(buffer: Arc<ResponseBuffer>, context: ExchangeContext) -> Self {
        Self { buffer, context }
    }

    pub fn on_start_async(&self) {
        trace!(uri = %self.context.uri, "Async response started");
    }

    /// Flushes the staged body. Returns `None` if it has already been flushed.
    pub fn on_complete(&self) -> Option<Bytes> {
        let flushed = self.buffer.copy_body_to_response();
        if let Some(bytes) = &flushed {
            debug!(
                uri = %self.context.uri,
                body_size = bytes.len(),
                "Async response flushed"
            );
        }
        flushed
    }

    /// Timeouts belong to the host; nothing is flushed here.
    pub fn on_timeout(&self) {}

    pub fn on_error(&self, error: &dyn std::error::Error) {
        error!(
            uri = %self.context.uri,
            error = %error,
            "Async request was complete with error"
        );
    }
}

/// Response body that withholds the handler's stream until it has finished,
/// then delivers the buffered bytes as a single data frame followed by any
/// trailers.
pub struct DeferredBody {
    inner: CachingBody<Body>,
    hook: AsyncCompletionHook,
    started: bool,
    finished: bool,
    trailers: Option<HeaderMap>,
}

impl DeferredBody {
    pub fn new(inner: CachingBody<Body>, hook: AsyncCompletionHook) -> Self {
        Self {
            inner,
            hook,
            started: false,
            finished: false,
            trailers: None,
        }
    }
}

impl HttpBody for DeferredBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if !this.started {
            this.started = true;
            this.hook.on_start_async();
        }

        loop {
            if this.finished {
                return Poll::Ready(this.trailers.take().map(|t| Ok(Frame::trailers(t))));
            }

            match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
                // Data frames are already recorded by the caching layer.
                Some(Ok(frame)) => {
                    if let Ok(trailers) = frame.into_trailers() {
                        this.trailers = Some(trailers);
                    }
                }
                Some(Err(e)) => {
                    this.finished = true;
                    this.trailers = None;
                    this.hook.on_error(&e);
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.finished = true;
                    if let Some(bytes) = this.hook.on_complete() {
                        if !bytes.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(bytes))));
                        }
                    }
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished && self.trailers.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn deferred(body: Body) -> (DeferredBody, Arc<ResponseBuffer>) {
        let buffer = Arc::new(ResponseBuffer::new());
        let hook = AsyncCompletionHook::new(buffer.clone(), ExchangeContext::new("/events"));
        (DeferredBody::new(CachingBody::new(body, buffer.clone()), hook), buffer)
    }

    #[tokio::test]
    async fn test_flushes_once_at_end_of_stream() {
        let chunks = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from("chunk1")),
            Ok(Bytes::from("chunk2")),
        ]);
        let (mut body, buffer) = deferred(Body::from_stream(chunks));

        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "chunk1chunk2");
        assert!(buffer.is_flushed());
        assert!(body.frame().await.is_none());
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn test_waits_for_producer_task() {
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(4);
        let producer = tokio::spawn(async move {
            for chunk in ["data: 1\n\n", "data: 2\n\n"] {
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(Ok(Bytes::from(chunk))).await.unwrap();
            }
        });
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let (body, buffer) = deferred(Body::from_stream(events));

        let delivered = body.collect().await.unwrap().to_bytes();
        producer.await.unwrap();

        assert_eq!(delivered, "data: 1\n\ndata: 2\n\n");
        assert!(buffer.is_flushed());
    }

    #[tokio::test]
    async fn test_error_is_surfaced_without_flush() {
        let chunks = stream::iter(vec![
            Ok(Bytes::from("partial")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")),
        ]);
        let (mut body, buffer) = deferred(Body::from_stream(chunks));

        assert!(body.frame().await.unwrap().is_err());
        assert!(body.frame().await.is_none());
        assert!(!buffer.is_flushed());
    }

    #[tokio::test]
    async fn test_empty_stream_delivers_nothing() {
        let chunks = stream::iter(Vec::<Result<Bytes, std::io::Error>>::new());
        let (body, buffer) = deferred(Body::from_stream(chunks));

        assert!(body.collect().await.unwrap().to_bytes().is_empty());
        assert!(buffer.is_flushed());
    }

    #[test]
    fn test_hook_completion_is_exactly_once() {
        let buffer = Arc::new(ResponseBuffer::new());
        buffer.write(b"done");
        let hook = AsyncCompletionHook::new(buffer.clone(), ExchangeContext::new("/jobs"));

        hook.on_timeout();
        assert!(!buffer.is_flushed());

        assert_eq!(hook.on_complete().unwrap(), "done");
        assert!(hook.on_complete().is_none());
        // A competing flush from another path finds nothing left.
        assert!(buffer.copy_body_to_response().is_none());
    }
}

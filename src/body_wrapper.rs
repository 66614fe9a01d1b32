//! Body buffering and capture utilities.
//!
//! Requests are read eagerly into memory and handed to the downstream handler
//! as a fresh body over the same bytes, so both the logger and the handler see
//! the full payload. Responses pass through [`CachingBody`], a decorator that
//! records a copy of every data frame into a [`ResponseBuffer`]. The buffer
//! stages those bytes until they are released to the real client, which
//! happens exactly once.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::Request;
use bytes::BytesMut;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;
use tracing::error;

use crate::error::BodyCaptureError;

/// Reads the whole request body into memory and puts an identical body back
/// on the request.
///
/// When reading fails the request gets a body that yields the same error, so
/// the downstream handler reports the transport failure as it normally would.
///
/// # Examples
///
/// ```rust
/// use axum::body::Body;
/// use axum::extract::Request;
/// use http_body_util::BodyExt;
/// use payload_logger::body_wrapper::buffer_request;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let request = Request::new(Body::from("Hello, World!"));
/// let (request, captured) = buffer_request(request).await;
///
/// assert_eq!(captured?, "Hello, World!");
/// // The handler still receives the full body
/// let body = request.into_body().collect().await?.to_bytes();
/// assert_eq!(body, "Hello, World!");
/// # Ok(())
/// # }
/// ```
pub async fn buffer_request(request: Request) -> (Request, Result<Bytes, BodyCaptureError>) {
    let (parts, body) = request.into_parts();
    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let request = Request::from_parts(parts, Body::from(bytes.clone()));
            (request, Ok(bytes))
        }
        Err(e) => {
            error!(uri = %parts.uri, error = %e, "Error buffering request body");
            let captured = Err(BodyCaptureError::StreamError(e.to_string()));
            (Request::from_parts(parts, failed_body(e)), captured)
        }
    }
}

/// A body that yields `error` on its first poll.
pub fn failed_body(error: axum::Error) -> Body {
    Body::from_stream(futures::stream::once(async move {
        Err::<Bytes, axum::Error>(error)
    }))
}

/// In-memory staging area for a response body.
///
/// Bytes are appended as the handler produces them and handed to the real
/// output by [`ResponseBuffer::copy_body_to_response`], which succeeds once and
/// only once no matter which completion path calls it.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    content: Mutex<BytesMut>,
    flushed: AtomicBool,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, chunk: &[u8]) {
        self.lock().extend_from_slice(chunk);
    }

    /// A copy of the bytes currently staged.
    pub fn content(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }

    /// Releases the staged bytes for delivery to the client.
    ///
    /// The first call takes the bytes; every later call returns `None`.
    pub fn copy_body_to_response(&self) -> Option<Bytes> {
        if self
            .flushed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(self.lock().split().freeze())
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Body decorator that writes a copy of every data frame into a [`ResponseBuffer`]
/// while passing frames through unchanged.
#[derive(Debug)]
pub struct CachingBody<B> {
    inner: B,
    buffer: Arc<ResponseBuffer>,
}

impl<B> CachingBody<B> {
    pub fn new(inner: B, buffer: Arc<ResponseBuffer>) -> Self {
        Self { inner, buffer }
    }
}

impl<B> HttpBody for CachingBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let frame = ready!(Pin::new(&mut self.inner).poll_frame(cx));
        if let Some(Ok(frame)) = &frame {
            if let Some(data) = frame.data_ref() {
                self.buffer.write(data);
            }
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Pulls every frame through `body`, leaving the data in its buffer.
pub async fn drain<B>(mut body: CachingBody<B>) -> Result<(), B::Error>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    while let Some(frame) = body.frame().await {
        frame?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_request_body_is_rereadable() {
        let request = Request::new(Body::from("Hello, World!"));
        let (request, captured) = buffer_request(request).await;

        assert_eq!(captured.unwrap(), "Hello, World!");
        let body = request.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "Hello, World!");
    }

    #[tokio::test]
    async fn test_request_stream_error_reaches_handler() {
        let body = Body::from_stream(stream::iter([
            Ok(Bytes::from("partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]));
        let (request, captured) = buffer_request(Request::new(body)).await;

        assert!(matches!(captured, Err(BodyCaptureError::StreamError(_))));
        assert!(request.into_body().collect().await.is_err());
    }

    #[tokio::test]
    async fn test_caching_body_records_chunks() {
        let chunks = stream::iter(vec![
            Ok::<_, std::convert::Infallible>(Bytes::from("chunk1")),
            Ok(Bytes::from("chunk2")),
            Ok(Bytes::from("chunk3")),
        ]);
        let buffer = Arc::new(ResponseBuffer::new());
        let body = CachingBody::new(Body::from_stream(chunks), buffer.clone());

        let passed_through = body.collect().await.unwrap().to_bytes();
        assert_eq!(passed_through, "chunk1chunk2chunk3");
        assert_eq!(buffer.content(), "chunk1chunk2chunk3");
    }

    #[tokio::test]
    async fn test_drain_fills_buffer() {
        let large_data = "x".repeat(2048);
        let buffer = Arc::new(ResponseBuffer::new());
        drain(CachingBody::new(Body::from(large_data.clone()), buffer.clone()))
            .await
            .unwrap();

        assert_eq!(buffer.len(), 2048);
        assert_eq!(buffer.content(), large_data);
    }

    #[test]
    fn test_flush_happens_once() {
        let buffer = ResponseBuffer::new();
        buffer.write(b"{\"response\":\"ok\"}");

        assert!(!buffer.is_flushed());
        assert_eq!(buffer.copy_body_to_response().unwrap(), "{\"response\":\"ok\"}");
        assert!(buffer.is_flushed());
        assert!(buffer.copy_body_to_response().is_none());
    }

    #[test]
    fn test_concurrent_flush_has_single_winner() {
        let buffer = Arc::new(ResponseBuffer::new());
        buffer.write(b"payload");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let buffer = buffer.clone();
                std::thread::spawn(move || buffer.copy_body_to_response())
            })
            .collect();
        let flushed: Vec<_> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(flushed, vec![Bytes::from("payload")]);
    }

    #[test]
    fn test_empty_buffer_flushes_empty_bytes() {
        let buffer = ResponseBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.copy_body_to_response(), Some(Bytes::new()));
    }
}

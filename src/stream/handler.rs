//! Per-client stream adapter
//!
//! A `StreamHandler` owns one subscription. It either becomes an HTTP body
//! (the router drops the body when the client goes away, which drops the
//! subscription) or writes parts straight to an `AsyncWrite` sink until a
//! write fails.

use std::convert::Infallible;
use std::io;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::OwnedSemaphorePermit;

use crate::broadcast::{Broadcaster, SubscriberId, Subscription};

use super::multipart::{content_type, part_chunks};

/// Streams frames from the broadcaster to one client
#[derive(Debug)]
pub struct StreamHandler {
    subscription: Subscription,
    _permit: Option<OwnedSemaphorePermit>,
}

impl StreamHandler {
    /// Subscribe a new client
    pub fn new(broadcaster: &Broadcaster) -> Self {
        let subscription = broadcaster.subscribe();
        tracing::info!(subscriber = %subscription.id(), "Stream client connected");

        Self {
            subscription,
            _permit: None,
        }
    }

    /// Hold a connection-limit permit for the lifetime of the stream
    pub fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Subscriber id of this client
    pub fn id(&self) -> SubscriberId {
        self.subscription.id()
    }

    /// Turn the handler into a body stream of multipart chunks
    ///
    /// The stream ends when the subscription is closed. Dropping it
    /// deregisters the client.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        stream::unfold(self, |mut handler| async move {
            let frame = handler.subscription.recv().await?;
            Some((part_chunks(&frame), handler))
        })
        .flat_map(|chunks| stream::iter(chunks.into_iter().map(Ok)))
    }

    /// Write parts to `sink` until the subscription closes or a write fails
    ///
    /// Returns the number of frames written.
    pub async fn write_to<W>(mut self, sink: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;

        while let Some(frame) = self.subscription.recv().await {
            for chunk in part_chunks(&frame) {
                if let Err(e) = sink.write_all(&chunk).await {
                    tracing::debug!(
                        subscriber = %self.id(),
                        frames = written,
                        error = %e,
                        "Stream write failed"
                    );
                    return Err(e);
                }
            }
            sink.flush().await?;
            written += 1;
        }

        Ok(written)
    }
}

impl Drop for StreamHandler {
    fn drop(&mut self) {
        tracing::info!(
            subscriber = %self.subscription.id(),
            frames = self.subscription.received(),
            skipped = self.subscription.skipped(),
            "Stream client disconnected"
        );
    }
}

impl IntoResponse for StreamHandler {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type()),
                (
                    header::CACHE_CONTROL,
                    "no-cache, no-store, must-revalidate".to_string(),
                ),
                (header::PRAGMA, "no-cache".to_string()),
            ],
            Body::from_stream(self.into_stream()),
        )
            .into_response()
    }
}

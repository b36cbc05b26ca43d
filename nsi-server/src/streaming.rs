//! Chunked streaming of encoded features into HTTP response bodies.
//!
//! The encoder runs on a spawned task and pushes chunks through a bounded
//! channel. The handler waits for the first message so that failures raised
//! before any output (bad input, unreachable database) still become a proper
//! error response. Failures after the first chunk can only truncate the body.

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use nsi_query::{FeatureSink, QueryError};
use std::future::Future;
use tokio::sync::mpsc;

/// Chunks buffered between the encoder and the socket.
const CHANNEL_CAPACITY: usize = 64;

type Chunk = std::result::Result<Bytes, QueryError>;

/// Feature sink feeding an HTTP body.
pub struct ChannelSink {
    tx: mpsc::Sender<Chunk>,
}

#[async_trait]
impl FeatureSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> nsi_query::Result<()> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| QueryError::Sink("client disconnected".to_string()))
    }
}

/// Run `produce` on its own task and stream what it writes as the response.
pub async fn stream_features<F, Fut>(content_type: &'static str, produce: F) -> Result<Response>
where
    F: FnOnce(ChannelSink) -> Fut + Send + 'static,
    Fut: Future<Output = nsi_query::Result<u64>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);
    let err_tx = tx.clone();

    tokio::spawn(async move {
        match produce(ChannelSink { tx }).await {
            Ok(count) => tracing::debug!(features = count, "stream finished"),
            Err(QueryError::Sink(reason)) => tracing::debug!(%reason, "stream abandoned"),
            Err(e) => {
                tracing::warn!(error = %e, "feature stream failed");
                let _ = err_tx.send(Err(e)).await;
            }
        }
    });

    let first = match rx.recv().await {
        Some(Ok(bytes)) => bytes,
        Some(Err(e)) => return Err(e.into()),
        None => Bytes::new(),
    };

    let rest = futures::stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        let mapped = item.map_err(|e| std::io::Error::other(e.to_string()));
        Some((mapped, rx))
    });
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(first) }).chain(rest);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from_stream(stream))
        .map_err(|e| ServerError::internal(e.to_string()))
}

//! HTTP transfer executor
//!
//! Writes file bytes to a presigned upload URL with a single `PUT`. The body
//! is streamed in chunks; every chunk handed to the transport reports the
//! running byte count over an unbounded channel, which the executor drains
//! into the caller's [`ProgressObserver`] while the request is in flight.

use super::{ProgressObserver, TransferExecutor, UploadError, UploadFile, UploadTarget};
use crate::api::request_failure;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::time::Duration;
use tokio::sync::mpsc;

/// Streams files to presigned URLs
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    http_client: reqwest::Client,
    chunk_size: usize,
}

impl HttpTransfer {
    /// Create a transfer executor.
    ///
    /// `connect_timeout` bounds connection setup only. `transfer_timeout`,
    /// when set, is a deadline on the whole `PUT` including the body.
    pub fn new(
        connect_timeout: Duration,
        transfer_timeout: Option<Duration>,
        chunk_size: usize,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
        if let Some(timeout) = transfer_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, chunk_size))
    }

    pub fn with_client(http_client: reqwest::Client, chunk_size: usize) -> Self {
        Self {
            http_client,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Split a body into chunks of at most `chunk_size` bytes without copying
fn split_chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

#[async_trait]
impl TransferExecutor for HttpTransfer {
    #[tracing::instrument(
        name = "upload.transfer",
        skip(self, target, file, progress),
        fields(
            file.name = %file.name(),
            http.method = "PUT",
            http.content_type = %file.content_type(),
            upload.bytes = file.size(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn transfer(
        &self,
        target: &UploadTarget,
        file: &UploadFile,
        progress: &dyn ProgressObserver,
    ) -> Result<(), UploadError> {
        let total = file.size();
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel::<u64>();

        let body = stream::iter(split_chunks(file.data(), self.chunk_size)).scan(
            0u64,
            move |sent, chunk| {
                *sent += chunk.len() as u64;
                // The receiver outlives the request; a closed channel only drops a report
                let _ = sent_tx.send(*sent);
                futures::future::ready(Some(Ok::<Bytes, std::io::Error>(chunk)))
            },
        );

        let request = self
            .http_client
            .put(&target.upload_url)
            .header(CONTENT_TYPE, file.content_type())
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body))
            .send();
        tokio::pin!(request);

        progress.on_progress(0, total);
        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                Some(sent) = sent_rx.recv() => progress.on_progress(sent, total),
            }
        };
        while let Ok(sent) = sent_rx.try_recv() {
            progress.on_progress(sent, total);
        }

        let response = result.map_err(|e| UploadError::Transfer(request_failure(&e)))?;
        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.trim();
            return Err(UploadError::Transfer(if body.is_empty() {
                format!("storage rejected upload (HTTP {})", status.as_u16())
            } else {
                format!(
                    "storage rejected upload (HTTP {}): {}",
                    status.as_u16(),
                    body
                )
            }));
        }

        tracing::debug!(bytes = total, "Transfer completed");
        Ok(())
    }
}

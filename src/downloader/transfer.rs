//! Single-file HTTP transfer into a partial file

use crate::retry::{IsRetryable, is_transient_io, is_transient_network};
use crate::utils::partial_path;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

/// Failure of one transfer attempt
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The server answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// The request or the body stream failed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Writing or moving the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response headers or body bytes arrived within the idle timeout
    #[error("transfer stalled for {0:?}")]
    Stalled(Duration),
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            TransferError::Status(status) => *status >= 500,
            TransferError::Network(e) => is_transient_network(e),
            TransferError::Io(e) => is_transient_io(e.kind()),
            TransferError::Stalled(_) => true,
        }
    }
}

/// Fetch `url` into `destination`
///
/// The body is streamed into `<destination>.part`, which is renamed onto
/// `destination` only once the whole body has been written. On any failure
/// the partial file is removed, so `destination` is never left half-written.
/// Returns the number of bytes written.
///
/// `idle` bounds every wait for the server (headers, then each body chunk),
/// not the transfer as a whole, so a slow but steady body always completes.
pub(super) async fn fetch_to_file(
    http: &reqwest::Client,
    url: &str,
    destination: &Path,
    idle: Duration,
) -> Result<u64, TransferError> {
    let part = partial_path(destination);

    let result = match stream_body(http, url, &part, idle).await {
        Ok(bytes) => tokio::fs::rename(&part, destination)
            .await
            .map(|()| bytes)
            .map_err(TransferError::from),
        Err(e) => Err(e),
    };

    if result.is_err() {
        match tokio::fs::remove_file(&part).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %part.display(), error = %e, "Failed to remove partial file");
            }
        }
    }
    result
}

async fn stream_body(
    http: &reqwest::Client,
    url: &str,
    part: &Path,
    idle: Duration,
) -> Result<u64, TransferError> {
    let mut response = timeout(idle, http.get(url).send())
        .await
        .map_err(|_| TransferError::Stalled(idle))??;

    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::Status(status.as_u16()));
    }

    let mut file = tokio::fs::File::create(part).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = timeout(idle, response.chunk())
        .await
        .map_err(|_| TransferError::Stalled(idle))??
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

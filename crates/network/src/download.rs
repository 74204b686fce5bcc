// crates/network/src/download.rs
//! Cancellable file transfers

use crate::client::Client;
use crate::error::{NetworkError, NetworkResult};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Called with the number of bytes received so far for one file
pub type ByteProgress<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// Path of the in-progress file for `destination`
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Moves bytes from a URL to a local file
#[async_trait]
pub trait FileDownloader: Send + Sync {
    /// Downloads `url` to `destination`, returning the bytes written
    ///
    /// Nothing is left at `destination` unless the transfer completes; on
    /// error or cancellation partial bytes are discarded.
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        progress: ByteProgress<'_>,
    ) -> NetworkResult<u64>;
}

/// [`FileDownloader`] streaming over HTTP
#[derive(Clone)]
pub struct HttpFileDownloader {
    client: Client,
}

impl HttpFileDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn stream_to(
        &self,
        url: &str,
        partial: &Path,
        cancel: &CancellationToken,
        progress: ByteProgress<'_>,
    ) -> NetworkResult<u64> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
            response = self.client.get(url) => response?,
        };

        let mut file = File::create(partial).await?;
        let mut stream = response.bytes_stream();
        let mut total_downloaded = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(NetworkError::Http)?;
            file.write_all(&chunk).await?;

            total_downloaded += chunk.len() as u64;
            progress(total_downloaded);
        }

        file.flush().await?;
        Ok(total_downloaded)
    }
}

#[async_trait]
impl FileDownloader for HttpFileDownloader {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        progress: ByteProgress<'_>,
    ) -> NetworkResult<u64> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = part_path(destination);
        match self.stream_to(url, &partial, cancel, progress).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, destination).await?;
                log::debug!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("Could not remove {}: {}", partial.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }
}

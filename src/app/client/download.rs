//! Raw-file retrieval with streaming and optional atomic archiving
//!
//! Bodies are read chunk by chunk and buffered whole, so memory use follows
//! the size of the raw file. When an archive path is given, each chunk is
//! also written to a temporary file that is renamed into place once the
//! transfer completes; on any failure the temporary file is removed.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::client::auth::SessionToken;
use crate::app::client::http::{ApiRequest, HttpHandler};
use crate::constants::{api, files};
use crate::errors::{DownloadError, DownloadResult, HttpError};

/// Raw-file download operations handler
pub struct DownloadHandler<'a> {
    http_handler: &'a HttpHandler,
    token: &'a SessionToken,
}

impl<'a> DownloadHandler<'a> {
    /// Creates a new DownloadHandler with the given HTTP handler and session
    pub fn new(http_handler: &'a HttpHandler, token: &'a SessionToken) -> Self {
        Self {
            http_handler,
            token,
        }
    }

    /// Temporary sibling used while a file is being written
    pub fn temp_path(destination: &Path) -> PathBuf {
        destination.with_extension(format!(
            "{}{}",
            destination
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or(""),
            files::TEMP_FILE_SUFFIX
        ))
    }

    /// Fetch the bytes behind `locator`
    ///
    /// When `archive` is set the bytes are also stored there atomically.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The final status after the retry loop is not a success
    /// - The body stream is interrupted
    /// - Archiving fails
    /// - The run is cancelled
    pub async fn fetch(
        &self,
        locator: &Url,
        archive: Option<&Path>,
        cancel: &CancellationToken,
    ) -> DownloadResult<Vec<u8>> {
        let request = ApiRequest::get(locator.clone())
            .header(AUTHORIZATION, self.token.bearer_header())
            .header(ACCEPT, HeaderValue::from_static(api::BINARY_ACCEPT));

        let response = self.http_handler.execute(&request, cancel).await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!("Failed to download {}: HTTP {}", locator, status);
            return Err(DownloadError::Status {
                url: locator.to_string(),
                status,
            });
        }

        let mut writer = match archive {
            Some(destination) => Some(ArchiveWriter::create(destination).await?),
            None => None,
        };

        let mut content = Vec::with_capacity(initial_capacity(response.content_length()));
        let mut stream = std::pin::pin!(response.bytes_stream());

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    if let Some(writer) = writer.take() {
                        writer.abandon().await;
                    }
                    return Err(DownloadError::Http(HttpError::Cancelled));
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Some(active) = writer.as_mut() {
                        if let Err(e) = active.write(&chunk).await {
                            if let Some(writer) = writer.take() {
                                writer.abandon().await;
                            }
                            return Err(e);
                        }
                    }
                    content.extend_from_slice(&chunk);
                }
                Some(Err(e)) => {
                    if let Some(writer) = writer.take() {
                        writer.abandon().await;
                    }
                    return Err(DownloadError::Stream(e));
                }
                None => break,
            }
        }

        if let Some(writer) = writer {
            writer.commit().await?;
        }

        tracing::debug!("Fetched {} bytes from {}", content.len(), locator);
        Ok(content)
    }
}

/// Bytes to reserve for a body; the declared length is only a hint
fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length.map_or(files::DOWNLOAD_CHUNK_SIZE, |len| {
        len.min(files::MAX_PREALLOC_BYTES) as usize
    })
}

/// Temp-file writer that renames into place on commit
struct ArchiveWriter {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl ArchiveWriter {
    async fn create(destination: &Path) -> DownloadResult<Self> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = DownloadHandler::temp_path(destination);
        let file = File::create(&temp_path).await?;
        Ok(Self {
            file,
            temp_path,
            final_path: destination.to_path_buf(),
        })
    }

    async fn write(&mut self, bytes: &[u8]) -> DownloadResult<()> {
        self.file.write_all(bytes).await?;
        Ok(())
    }

    async fn commit(self) -> DownloadResult<()> {
        let Self {
            mut file,
            temp_path,
            final_path,
        } = self;

        let flushed = file.flush().await;
        drop(file);
        let renamed = match flushed {
            Ok(()) => tokio::fs::rename(&temp_path, &final_path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = renamed {
            tracing::warn!("Could not archive {}: {}", final_path.display(), e);
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(DownloadError::AtomicOperationFailed {
                temp_path,
                final_path,
            });
        }

        tracing::info!("Saved raw file to: {}", final_path.display());
        Ok(())
    }

    async fn abandon(self) {
        drop(self.file);
        let _ = tokio::fs::remove_file(&self.temp_path).await;
    }
}

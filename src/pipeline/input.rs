//! Input resolution: read a local path or download a URL into memory.
//!
//! Spreadsheets are decoded from an in-memory buffer, so unlike a
//! path-based reader there is no need to spool downloads to disk. A declared
//! `Content-Length` above the size limit is rejected without downloading;
//! bodies without one (chunked responses) are read chunk by chunk and cut
//! off as soon as the running total passes the limit.

use crate::error::SplitError;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the source bytes for `input`, a local path or HTTP(S) URL.
///
/// # Errors
/// - [`SplitError::FileNotFound`] / [`SplitError::PermissionDenied`] for local paths
/// - [`SplitError::DownloadFailed`] / [`SplitError::DownloadTimeout`] for URLs
/// - [`SplitError::SourceTooLarge`] when the payload exceeds `max_bytes`
/// - [`SplitError::InvalidInput`] for an empty input string
pub async fn load_source(
    input: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<Vec<u8>, SplitError> {
    if input.trim().is_empty() {
        return Err(SplitError::InvalidInput {
            input: input.to_string(),
        });
    }

    let bytes = if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await?
    } else {
        read_local(input).await?
    };

    check_size(bytes.len(), max_bytes)?;
    Ok(bytes)
}

/// Reject payloads above the limit.
pub fn check_size(size: usize, limit: usize) -> Result<(), SplitError> {
    if size > limit {
        Err(SplitError::SourceTooLarge { size, limit })
    } else {
        Ok(())
    }
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, SplitError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(SplitError::FileNotFound { path });
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(SplitError::PermissionDenied { path })
        }
        Err(_) => Err(SplitError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: u64, max_bytes: usize) -> Result<Vec<u8>, SplitError> {
    info!("Downloading spreadsheet from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SplitError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            SplitError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            SplitError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(SplitError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared = response
        .content_length()
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX));
    if let Some(declared) = declared {
        check_size(declared, max_bytes)?;
    }

    let mut body = Vec::with_capacity(declared.unwrap_or(0));
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(map_send_err)?;
        check_size(body.len().saturating_add(chunk.len()), max_bytes)?;
        body.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes", body.len());
    Ok(body)
}

//! Input loading: read a PDF from a local path or an HTTP(S) URL.
//!
//! The session itself accepts raw bytes and trusts the caller to have
//! checked the file type. This module is that caller-side check for the CLI
//! and for library users who start from a path: it reads the bytes, derives
//! a display name, and rejects anything without the `%PDF` magic before it
//! ever reaches pdfium.

use crate::error::PdfChatError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// A document read into memory, ready for [`crate::session::Session::ingest_document`].
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// File name shown to the user and embedded in the prompt.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the input from disk or the network and validate its PDF magic.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedDocument, PdfChatError> {
    let doc = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else if input.trim().is_empty() {
        return Err(PdfChatError::InvalidInput {
            input: input.to_string(),
        });
    } else {
        read_local(Path::new(input)).await?
    };
    ensure_pdf_magic(&doc.name, &doc.bytes)?;
    Ok(doc)
}

/// Reject bytes that do not begin with `%PDF`.
pub fn ensure_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), PdfChatError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(PdfChatError::NotAPdf {
        name: name.to_string(),
        magic,
    })
}

async fn read_local(path: &Path) -> Result<LoadedDocument, PdfChatError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => PdfChatError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PdfChatError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = display_name(path);
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(LoadedDocument { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedDocument, PdfChatError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PdfChatError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        let reason = if e.is_timeout() {
            format!("timed out after {}s", timeout_secs)
        } else {
            e.to_string()
        };
        PdfChatError::DownloadFailed {
            url: url.to_string(),
            reason,
        }
    })?;

    if !response.status().is_success() {
        return Err(PdfChatError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PdfChatError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(LoadedDocument {
        name: filename_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of the URL when it looks like a file name.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

/// Display name for a path, falling back to the whole path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

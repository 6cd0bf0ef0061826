//! `GET /stream/{token}/{id}/{name}`: verify the link and stream the file

use crate::crypto::verify;
use crate::error::Error;
use crate::server::{AppError, AppState};
use crate::storage::StoredFile;

use axum::body::Body;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{error, info, warn};

/// Log download progress every 5 MiB
const PROGRESS_LOG_INTERVAL: u64 = 5 * 1024 * 1024;

/// RFC 5987 `attr-char`: everything else gets percent-encoded
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Stream a stored file to the caller
///
/// Segments that don't even decode are denied like any other bad link.
pub async fn stream_file(
    State(state): State<AppState>,
    path: Result<Path<(String, String, String)>, PathRejection>,
) -> Result<Response, AppError> {
    let Path((token, id, file_name)) = path.map_err(|e| {
        warn!("Rejected download request with undecodable path: {}", e);
        AppError::Forbidden
    })?;

    info!("Download request for file: {:?}, messageId: {:?}", file_name, id);

    let id = verify(&token, &id, state.secret()).map_err(|e| {
        warn!("Rejected download request for {:?}: {}", id, e);
        AppError::Forbidden
    })?;

    if !state.storage().is_connected() {
        error!("Storage client not connected");
        return Err(AppError::Unavailable);
    }

    let file = state
        .storage()
        .fetch(id)
        .await
        .map_err(|e| match e {
            Error::Busy(reason) => {
                warn!("Refusing download of message {}: {}", id, reason);
                AppError::Busy
            }
            e => {
                error!("Failed to fetch message {}: {}", id, e);
                AppError::Internal
            }
        })?
        .ok_or_else(|| {
            warn!("Message {} not found or has no file", id);
            AppError::NotFound
        })?;

    info!("Starting download stream for {:?}", file_name);
    let size = file.size;
    let body = Body::from_stream(with_progress(file, file_name.clone()));

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, content_disposition(&file_name));
    if let Some(size) = size {
        response = response.header(header::CONTENT_LENGTH, size);
    }

    response.body(body).map_err(|e| {
        error!("Failed to build response: {}", e);
        AppError::Internal
    })
}

/// `attachment` disposition carrying the display name
///
/// The quoted `filename` is an ASCII-safe fallback; names that needed
/// changing also get an exact UTF-8 `filename*` parameter.
pub fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            ' ' => ' ',
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    let mut value = format!("attachment; filename=\"{}\"", fallback);
    if fallback != file_name {
        value.push_str("; filename*=UTF-8''");
        value.extend(utf8_percent_encode(file_name, ATTR_CHAR));
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Download bookkeeping carried through the response stream
struct Progress {
    content: BoxStream<'static, std::io::Result<Bytes>>,
    file_name: String,
    total: Option<u64>,
    sent: u64,
    next_mark: u64,
}

impl Progress {
    fn record(&mut self, len: usize) {
        self.sent += len as u64;
        if self.sent < self.next_mark {
            return;
        }
        self.next_mark = (self.sent / PROGRESS_LOG_INTERVAL + 1) * PROGRESS_LOG_INTERVAL;

        let sent_mb = self.sent as f64 / (1024.0 * 1024.0);
        match self.total {
            Some(total) if total > 0 => info!(
                "Download progress: {:.2}MB / {:.2}MB ({}%)",
                sent_mb,
                total as f64 / (1024.0 * 1024.0),
                self.sent * 100 / total
            ),
            _ => info!("Download progress: {:.2}MB", sent_mb),
        }
    }
}

/// Wrap a file's content so progress and completion get logged
fn with_progress(
    file: StoredFile,
    file_name: String,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let progress = Progress {
        content: file.content,
        file_name,
        total: file.size,
        sent: 0,
        next_mark: PROGRESS_LOG_INTERVAL,
    };

    futures::stream::unfold(progress, |mut progress| async move {
        match progress.content.next().await {
            Some(Ok(chunk)) => {
                progress.record(chunk.len());
                Some((Ok(chunk), progress))
            }
            Some(Err(e)) => {
                error!("Error streaming file {:?}: {}", progress.file_name, e);
                Some((Err(e), progress))
            }
            None => {
                info!(
                    "Download completed for {:?} ({} bytes)",
                    progress.file_name, progress.sent
                );
                None
            }
        }
    })
}

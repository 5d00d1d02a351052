//! File assembler: rehydrates a file's ordered blocks into a byte stream.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::db::entities::{block, file};
use crate::error::{Result, ServerError};
use crate::storage::ObjectStore;

/// Pipe buffer between the block fetcher and the HTTP response body.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Fetch each block's object in order and copy it to `writer`. Never holds
/// more than one block stream open; the full file is never buffered.
pub async fn stream_blocks<W>(
    store: &dyn ObjectStore,
    blocks: &[block::Model],
    writer: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for b in blocks {
        let mut reader = store.get(&b.object_key).await.map_err(|e| {
            tracing::error!(object_key = %b.object_key, error = %e, "block fetch failed");
            ServerError::Storage(e)
        })?;

        tokio::io::copy(&mut reader, writer).await.map_err(|e| {
            tracing::error!(object_key = %b.object_key, error = %e, "block stream copy failed");
            ServerError::Io(e)
        })?;
    }
    writer.flush().await?;
    Ok(())
}

/// Build the streaming download response for a file: framing headers plus a
/// body fed block-by-block from the object store. A mid-stream fetch failure
/// drops the writer, which terminates the connection; no status or error
/// body can follow the first payload byte.
pub fn file_response(
    file: &file::Model,
    preview: bool,
    store: Arc<dyn ObjectStore>,
    blocks: Vec<block::Model>,
) -> Result<Response> {
    let mime = if file.mime_type.is_empty() {
        "application/octet-stream"
    } else {
        file.mime_type.as_str()
    };

    let style = if preview { "inline" } else { "attachment" };
    let disposition = content_disposition(style, &file.name);

    let (reader, mut writer) = tokio::io::duplex(STREAM_BUFFER_SIZE);
    tokio::spawn(async move {
        if let Err(e) = stream_blocks(store.as_ref(), &blocks, &mut writer).await {
            tracing::error!(error = %e, "download stream aborted mid-flight");
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CONTENT_LENGTH, file.total_size.to_string())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| ServerError::Internal(format!("building download response: {e}")))
}

/// Header-safe `Content-Disposition` value with an RFC 5987 encoded
/// filename for non-ASCII names.
fn content_disposition(style: &str, filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                String::from(b as char)
            }
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("{style}; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}

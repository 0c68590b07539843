//! Byte delivery of media files with HTTP range support.
//!
//! Bodies are produced lazily, one chunk of at most [`CHUNK_SIZE`] bytes at a
//! time, so a file is never loaded into memory as a whole. A stream cannot be
//! resumed: a new range request opens the file again at the new offset.

use std::io::SeekFrom;
use std::path::Path;

use async_stream::try_stream;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::Stream;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{instrument, trace};

use crate::errors::Error;

pub const CHUNK_SIZE: usize = 64 * 1024;
pub const FALLBACK_CONTENT_TYPE: &str = "video/mp4";

/// Inclusive byte window into a file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RangeRequest {
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

/// Interprets an optional `Range` header against a file of `total` bytes.
///
/// Only the first range of a `bytes=` header is honoured. A header that is
/// present but cannot be parsed is treated as `bytes=0-`.
pub fn resolve_range(header: Option<&str>, total: u64) -> RangeRequest {
    let Some(header) = header else {
        return RangeRequest::Full;
    };
    if total == 0 {
        return RangeRequest::Unsatisfiable;
    }
    let last = total - 1;
    let whole = RangeRequest::Partial(ByteRange {
        start: 0,
        end: last,
    });

    let Some(ranges) = header.trim().strip_prefix("bytes=") else {
        return whole;
    };
    let first = ranges.split(',').next().unwrap_or_default().trim();
    let Some((start, end)) = first.split_once('-') else {
        return whole;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // suffix form: the final `end` bytes
        return match end.parse::<u64>() {
            Ok(0) => RangeRequest::Unsatisfiable,
            Ok(suffix) => RangeRequest::Partial(ByteRange {
                start: total.saturating_sub(suffix),
                end: last,
            }),
            Err(_) => whole,
        };
    }
    let Ok(start) = start.parse::<u64>() else {
        return whole;
    };
    let end = if end.is_empty() {
        last
    } else {
        match end.parse::<u64>() {
            Ok(end) => end.min(last),
            Err(_) => return whole,
        }
    };
    if start > last {
        return RangeRequest::Unsatisfiable;
    }
    if end < start {
        return whole;
    }
    RangeRequest::Partial(ByteRange { start, end })
}

/// Picks a content type from the file extension, defaulting to a generic video type.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_owned()
}

/// Streams `path`, honouring an optional `Range` header.
#[instrument(err)]
pub async fn stream_file(path: &Path, range: Option<&str>) -> Result<Response, Error> {
    let file = open(path).await?;
    let total = file.metadata().await?.len();
    let content_type = content_type_for(path);

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes");
    let response = match resolve_range(range, total) {
        RangeRequest::Full => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, total)
            .body(Body::from_stream(chunks(file, 0, total))),
        RangeRequest::Partial(window) => {
            trace!("serving bytes {}-{}/{total}", window.start, window.end);
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{total}", window.start, window.end),
                )
                .header(header::CONTENT_LENGTH, window.length())
                .body(Body::from_stream(chunks(file, window.start, window.length())))
        }
        RangeRequest::Unsatisfiable => return Err(Error::RangeNotSatisfiable(total)),
    };
    response.map_err(|e| Error::Internal(e.into()))
}

/// Serves the whole file as an attachment named `download_name`.
pub async fn download_file(path: &Path, download_name: &str) -> Result<Response, Error> {
    let mut response = stream_file(path, None).await?;
    let encoded = utf8_percent_encode(download_name, NON_ALPHANUMERIC);
    let disposition = format!("attachment; filename*=UTF-8''{encoded}");
    let value = HeaderValue::from_str(&disposition).map_err(|e| Error::Internal(e.into()))?;
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, value);
    Ok(response)
}

/// `title` plus the extension of the stored file, e.g. `Pilot.mkv`.
pub fn download_name(title: &str, stored_name: &str) -> String {
    match Path::new(stored_name).extension().and_then(|e| e.to_str()) {
        Some(extension) => format!("{title}.{extension}"),
        None => title.to_owned(),
    }
}

async fn open(path: &Path) -> Result<File, Error> {
    match File::open(path).await {
        Ok(file) => Ok(file),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound("media file"))
        }
        Err(err) => Err(err.into()),
    }
}

fn chunks(mut file: File, start: u64, len: u64) -> impl Stream<Item = std::io::Result<Bytes>> {
    try_stream! {
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        let mut remaining = len;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        while remaining > 0 {
            let wanted = usize::try_from(remaining).map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE));
            let read = file.read(&mut buffer[..wanted]).await?;
            if read == 0 {
                break;
            }
            remaining -= read as u64;
            yield Bytes::copy_from_slice(&buffer[..read]);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use axum::body::to_bytes;

    use super::*;

    fn source_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn media_file(extension: &str, len: usize) -> (tempfile::NamedTempFile, Vec<u8>) {
        let data = source_bytes(len);
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        (file, data)
    }

    #[test]
    fn test_resolve_range_closed() {
        assert_eq!(
            resolve_range(Some("bytes=100-199"), 1000),
            RangeRequest::Partial(ByteRange {
                start: 100,
                end: 199
            })
        );
    }

    #[test]
    fn test_resolve_range_open_end() {
        assert_eq!(
            resolve_range(Some("bytes=500-"), 1000),
            RangeRequest::Partial(ByteRange {
                start: 500,
                end: 999
            })
        );
    }

    #[test]
    fn test_resolve_range_end_is_clamped() {
        assert_eq!(
            resolve_range(Some("bytes=900-5000"), 1000),
            RangeRequest::Partial(ByteRange {
                start: 900,
                end: 999
            })
        );
    }

    #[test]
    fn test_resolve_range_suffix() {
        assert_eq!(
            resolve_range(Some("bytes=-100"), 1000),
            RangeRequest::Partial(ByteRange {
                start: 900,
                end: 999
            })
        );
    }

    #[test]
    fn test_resolve_range_malformed_falls_back_to_start() {
        let whole = RangeRequest::Partial(ByteRange { start: 0, end: 999 });
        assert_eq!(resolve_range(Some("items=1-2"), 1000), whole);
        assert_eq!(resolve_range(Some("bytes=abc-def"), 1000), whole);
        assert_eq!(resolve_range(Some("bytes=300-100"), 1000), whole);
        assert_eq!(resolve_range(Some("bytes="), 1000), whole);
    }

    #[test]
    fn test_resolve_range_without_header() {
        assert_eq!(resolve_range(None, 1000), RangeRequest::Full);
    }

    #[test]
    fn test_resolve_range_past_end() {
        assert_eq!(
            resolve_range(Some("bytes=1000-"), 1000),
            RangeRequest::Unsatisfiable
        );
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.mkv")), "video/x-matroska");
        assert_eq!(content_type_for(Path::new("a.unknownext")), "video/mp4");
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name("Pilot", "abc_pilot.mkv"), "Pilot.mkv");
        assert_eq!(download_name("Pilot", "abc"), "Pilot");
    }

    #[tokio::test]
    async fn test_stream_range() {
        let (file, data) = media_file(".mp4", 1000);
        let response = stream_file(file.path(), Some("bytes=100-199"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 100-199/1000"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), &data[100..200]);
    }

    #[tokio::test]
    async fn test_stream_full_file() {
        let (file, data) = media_file(".mkv", 3 * CHUNK_SIZE + 17);
        let response = stream_file(file.path(), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            data.len().to_string().as_str()
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/x-matroska");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_stream_range_spanning_chunks() {
        let len = 2 * CHUNK_SIZE + 10;
        let (file, data) = media_file(".mp4", len);
        let start = CHUNK_SIZE - 5;
        let header = format!("bytes={start}-");
        let response = stream_file(file.path(), Some(&header)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), &data[start..]);
    }

    #[tokio::test]
    async fn test_stream_malformed_range_serves_from_start() {
        let (file, data) = media_file(".mp4", 1000);
        let response = stream_file(file.path(), Some("bytes=oops")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-999/1000");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_stream_unsatisfiable_range() {
        let (file, _) = media_file(".mp4", 1000);
        let result = stream_file(file.path(), Some("bytes=2000-")).await;
        assert!(matches!(result, Err(Error::RangeNotSatisfiable(1000))));
    }

    #[tokio::test]
    async fn test_stream_missing_file() {
        let result = stream_file(Path::new("/nonexistent/movie.mp4"), None).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_download_sets_disposition() {
        let (file, _) = media_file(".mp4", 10);
        let response = download_file(file.path(), "Mon Film.mp4").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename*=UTF-8''Mon%20Film%2Emp4"
        );
    }
}

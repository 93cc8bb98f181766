//! Media ingestion pipeline
//!
//! Turns an arbitrary image locator into bytes this service hosts itself:
//!
//! - **locator**: classifies an input string (https, http, inline payload,
//!   caller-side staged path, unsupported)
//! - **inline**: decodes `data:image/...;base64,` payloads, tolerating
//!   line-wrapping, URL-safe alphabets and missing padding
//! - **multipart**: extracts the single `file` field from an upload body
//! - **fetch**: downloads remote images with status, type, size and
//!   private-network checks
//! - **store**: writes validated bytes under an unpredictable name and
//!   serves them back through a shape-checked lookup
//! - **ingest**: the orchestrator tying the above together under an
//!   [`IngestPolicy`]
//!
//! # Example
//!
//! ```ignore
//! use retouch::media::{ContentStore, FetchConfig, IngestPolicy, MediaIngestor, RemoteFetcher};
//!
//! let store = ContentStore::open("/tmp/retouch-uploads", "https://img.example").await?;
//! let fetcher = RemoteFetcher::new(FetchConfig::default())?;
//! let ingestor = MediaIngestor::new(IngestPolicy::RemoteAndInline, fetcher, store);
//!
//! let artifact = ingestor.ingest("https://example.com/cat.jpg").await?;
//! println!("re-hosted at {}", artifact.public_url);
//! ```

pub mod fetch;
pub mod ingest;
pub mod inline;
pub mod locator;
pub mod multipart;
pub mod store;

use axum::http::StatusCode;
use bytes::Bytes;
use thiserror::Error;

pub use fetch::{FetchConfig, RemoteFetcher, DEFAULT_FETCH_TIMEOUT_SECS, MAX_REDIRECTS};
pub use ingest::{IngestPolicy, MediaIngestor, ACCEPTED_MEDIA_TYPES};
pub use inline::decode_inline;
pub use locator::{classify, strip_sandbox_prefix, LocatorKind};
pub use multipart::{boundary_from_content_type, extract_file_field, MultipartFile};
pub use store::{content_type_for_name, ContentStore, RetrievedFile, StoredArtifact};

/// Default ceiling on a single image, encoded or decoded (15 MiB).
pub const DEFAULT_MAX_BYTES: usize = 15 * 1024 * 1024;

/// Longest response-body excerpt carried inside an error.
pub(crate) const ERROR_EXCERPT_CHARS: usize = 200;

/// Errors raised while resolving, validating, storing or retrieving media.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("no image locator was provided")]
    MissingInput,

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error(
        "local path '{0}' only exists in the caller's sandbox and cannot be read by this service; \
         upload the file or pass an https URL or a data:image/...;base64 payload instead"
    )]
    LocalPathUnreachable(String),

    #[error("invalid inline encoding: {0}")]
    InvalidEncoding(String),

    #[error("inline payload is truncated ({0} base64 characters cannot be padded)")]
    TruncatedPayload(usize),

    #[error("payload is {size} bytes, exceeding the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("remote fetch failed{}: {detail}", status_suffix(.status))]
    RemoteFetchFailed { status: Option<u16>, detail: String },

    #[error("remote content is not an image (content-type: {0})")]
    NotAnImage(String),

    #[error("refusing to fetch from private or local host '{0}'")]
    BlockedHost(String),

    #[error("invalid multipart body: {0}")]
    InvalidMultipart(String),

    #[error("no file field found in multipart body")]
    NoFileField,

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("failed to store artifact: {0}")]
    StorageWriteFailed(String),

    #[error("failed to read artifact: {0}")]
    StorageReadFailed(String),

    #[error("not found")]
    NotFound,
}

impl MediaError {
    /// Conventional HTTP status for this failure on the upload and retrieval endpoints.
    pub fn http_status(&self) -> StatusCode {
        match self {
            MediaError::NotFound => StatusCode::NOT_FOUND,
            MediaError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            MediaError::UnsupportedMediaType(_) | MediaError::NotAnImage(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            MediaError::RemoteFetchFailed { .. } => StatusCode::BAD_GATEWAY,
            MediaError::StorageWriteFailed(_) | MediaError::StorageReadFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            MediaError::MissingInput
            | MediaError::UnsupportedInput(_)
            | MediaError::LocalPathUnreachable(_)
            | MediaError::InvalidEncoding(_)
            | MediaError::TruncatedPayload(_)
            | MediaError::BlockedHost(_)
            | MediaError::InvalidMultipart(_)
            | MediaError::NoFileField => StatusCode::BAD_REQUEST,
        }
    }
}

/// Validated image bytes ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMedia {
    /// Declared media type without parameters, e.g. `image/png`.
    pub media_type: String,
    /// Raw image bytes; never empty.
    pub bytes: Bytes,
    /// Original file name or URL path segment, used only for extension fallback.
    pub name_hint: Option<String>,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with HTTP {s}")).unwrap_or_default()
}

/// Reject empty buffers and buffers over `limit`.
pub(crate) fn check_size(len: usize, limit: usize) -> Result<(), MediaError> {
    if len == 0 {
        return Err(MediaError::InvalidEncoding("image data is empty".to_string()));
    }
    if len > limit {
        return Err(MediaError::PayloadTooLarge { size: len, limit });
    }
    Ok(())
}

/// Lowercased media type with any `; param=...` suffix removed.
pub(crate) fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Truncate `text` to a short, single-line excerpt for error messages.
pub(crate) fn excerpt(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(ERROR_EXCERPT_CHARS)
        .collect();
    flat.trim().to_string()
}

//! Media ingestion orchestrator.
//!
//! classify -> decode or fetch -> validate -> store -> public URL.
//! Every accepted input is re-hosted, even when it is already public, so the
//! enhancement backend only ever sees URLs this service serves itself.
//! Nothing is written unless validation fully succeeds.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{
    check_size, classify, decode_inline, essence, strip_sandbox_prefix, ContentStore,
    DecodedMedia, LocatorKind, MediaError, MultipartFile, RemoteFetcher, StoredArtifact,
};

/// Media types accepted on every ingestion path.
pub const ACCEPTED_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Canonical form of `media_type` if it is on the allow-list.
fn accepted_media_type(media_type: &str) -> Option<&'static str> {
    let media_type = essence(media_type);
    let media_type = match media_type.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg",
        other => other,
    };
    ACCEPTED_MEDIA_TYPES.iter().copied().find(|t| *t == media_type)
}

/// Which locator kinds the orchestrator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestPolicy {
    /// Only `https://` URLs.
    HttpsOnly,
    /// `https://` and `http://` URLs.
    Remote,
    /// Remote URLs plus inline `data:image/...;base64,` payloads.
    #[default]
    RemoteAndInline,
}

impl IngestPolicy {
    pub fn accepts(self, kind: LocatorKind) -> bool {
        match (self, kind) {
            (_, LocatorKind::HttpsUrl) => true,
            (IngestPolicy::Remote | IngestPolicy::RemoteAndInline, LocatorKind::HttpUrl) => true,
            (IngestPolicy::RemoteAndInline, LocatorKind::InlineEncoded) => true,
            _ => false,
        }
    }

    /// Human-readable list of what this policy accepts.
    pub fn describe(self) -> &'static str {
        match self {
            IngestPolicy::HttpsOnly => "an https:// image URL",
            IngestPolicy::Remote => "an http(s):// image URL",
            IngestPolicy::RemoteAndInline => {
                "an http(s):// image URL or a data:image/<type>;base64,<payload> string"
            }
        }
    }
}

impl std::fmt::Display for IngestPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpsOnly => write!(f, "https-only"),
            Self::Remote => write!(f, "remote"),
            Self::RemoteAndInline => write!(f, "remote-and-inline"),
        }
    }
}

impl FromStr for IngestPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "https-only" | "https" | "strict" => Ok(Self::HttpsOnly),
            "remote" | "rehost" => Ok(Self::Remote),
            "remote-and-inline" | "inline" | "all" => Ok(Self::RemoteAndInline),
            _ => Err(format!("Invalid ingest policy: {}", s)),
        }
    }
}

/// Resolves locators into stored artifacts.
#[derive(Debug, Clone)]
pub struct MediaIngestor {
    policy: IngestPolicy,
    fetcher: RemoteFetcher,
    store: ContentStore,
}

impl MediaIngestor {
    pub fn new(policy: IngestPolicy, fetcher: RemoteFetcher, store: ContentStore) -> Self {
        Self {
            policy,
            fetcher,
            store,
        }
    }

    pub fn policy(&self) -> IngestPolicy {
        self.policy
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn max_bytes(&self) -> usize {
        self.fetcher.config().max_bytes
    }

    /// Resolve `input` and re-host it, returning the stored artifact.
    pub async fn ingest(&self, input: &str) -> Result<StoredArtifact, MediaError> {
        let media = self.resolve(input).await?;
        self.store.store(&media).await
    }

    /// Resolve `input` to validated bytes without storing them.
    pub async fn resolve(&self, input: &str) -> Result<DecodedMedia, MediaError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MediaError::MissingInput);
        }

        let kind = classify(input);
        tracing::debug!(kind = %kind, len = input.len(), "Classified locator");

        let mut media = match kind {
            LocatorKind::LocalStagedPath => {
                return Err(MediaError::LocalPathUnreachable(
                    strip_sandbox_prefix(input).to_string(),
                ));
            }
            LocatorKind::Unsupported => {
                return Err(MediaError::UnsupportedInput(format!(
                    "expected {}",
                    self.policy.describe()
                )));
            }
            _ if !self.policy.accepts(kind) => {
                return Err(MediaError::UnsupportedInput(format!(
                    "{kind} locators are not accepted; expected {}",
                    self.policy.describe()
                )));
            }
            LocatorKind::HttpsUrl | LocatorKind::HttpUrl => self.fetcher.fetch(input).await?,
            LocatorKind::InlineEncoded => decode_inline(input, self.max_bytes())?,
        };
        media.media_type = accepted_media_type(&media.media_type)
            .ok_or_else(|| MediaError::UnsupportedMediaType(media.media_type.clone()))?
            .to_string();
        check_size(media.bytes.len(), self.max_bytes())?;
        Ok(media)
    }

    /// Validate and store a multipart upload.
    pub async fn ingest_upload(&self, upload: MultipartFile) -> Result<StoredArtifact, MediaError> {
        let media_type = accepted_media_type(&upload.media_type)
            .ok_or_else(|| MediaError::UnsupportedMediaType(essence(&upload.media_type)))?;
        if upload.content.is_empty() {
            return Err(MediaError::InvalidMultipart("uploaded file is empty".to_string()));
        }
        check_size(upload.content.len(), self.max_bytes())?;

        let media = DecodedMedia {
            media_type: media_type.to_string(),
            bytes: upload.content,
            name_hint: upload.filename,
        };
        self.store.store(&media).await
    }
}

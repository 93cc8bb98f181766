//! Content store for re-hosted images.
//!
//! Artifacts are written once under `<32 hex chars><ext>` and never mutated.
//! Lookups go through a strict name-shape check before the filesystem is
//! touched, so traversal and directory probing are impossible by
//! construction.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;

use super::{essence, DecodedMedia, MediaError};

/// Random bytes in an artifact id (128 bits).
pub const ID_BYTES: usize = 16;

/// Extension used when neither the name hint nor the media type is recognized.
pub const FALLBACK_EXTENSION: &str = ".bin";

/// Extensions an artifact name may carry.
pub const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bin"];

static ARTIFACT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{32}\.(?:jpg|jpeg|png|webp|gif|bin)$").expect("valid artifact regex")
});

/// A stored artifact, created exactly once per successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    pub id: String,
    pub extension: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub public_url: String,
    pub media_type: String,
    pub size: usize,
}

impl StoredArtifact {
    /// File name under the storage directory and the `/files/` route.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.id, self.extension)
    }
}

/// Bytes read back from the store.
#[derive(Debug, Clone)]
pub struct RetrievedFile {
    pub bytes: Bytes,
    pub content_type: &'static str,
}

/// Write-once file store rooted at a dedicated upload directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    dir: PathBuf,
    public_base_url: String,
}

impl ContentStore {
    /// Open (creating if needed) the storage directory.
    pub async fn open(
        dir: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Result<Self, MediaError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            MediaError::StorageWriteFailed(format!(
                "cannot create storage directory {}: {e}",
                dir.display()
            ))
        })?;
        tracing::info!(dir = %dir.display(), "Content store ready");
        Ok(Self {
            dir,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// Public URL for a stored file name.
    pub fn public_url_for(&self, file_name: &str) -> String {
        format!("{}/files/{}", self.public_base_url, file_name)
    }

    /// Persist validated media under a fresh random name.
    ///
    /// The bytes go to a hidden temporary file first and are renamed into
    /// place, so a failed write leaves nothing retrievable behind.
    pub async fn store(&self, media: &DecodedMedia) -> Result<StoredArtifact, MediaError> {
        let id = generate_id()?;
        let extension = derive_extension(media.name_hint.as_deref(), &media.media_type);
        let file_name = format!("{id}{extension}");
        let path = self.dir.join(&file_name);
        let tmp_path = self.dir.join(format!(".{id}.part"));

        if let Err(e) = write_new(&tmp_path, &media.bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(MediaError::StorageWriteFailed(e.to_string()));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(MediaError::StorageWriteFailed(e.to_string()));
        }

        tracing::info!(
            id = %id,
            extension = %extension,
            media_type = %media.media_type,
            bytes = media.bytes.len(),
            "Stored artifact"
        );

        Ok(StoredArtifact {
            public_url: self.public_url_for(&file_name),
            id,
            extension,
            path,
            media_type: media.media_type.clone(),
            size: media.bytes.len(),
        })
    }

    /// Read an artifact back by file name.
    ///
    /// Names that are not `<32 lowercase hex><known ext>` are `NotFound`
    /// without any filesystem access.
    pub async fn retrieve(&self, name: &str) -> Result<RetrievedFile, MediaError> {
        if !is_valid_name(name) {
            tracing::debug!(name_len = name.len(), "Rejected artifact name");
            return Err(MediaError::NotFound);
        }
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(RetrievedFile {
                bytes: Bytes::from(bytes),
                content_type: content_type_for_name(name),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaError::NotFound),
            Err(e) => Err(MediaError::StorageReadFailed(e.to_string())),
        }
    }
}

/// Whether `name` has the exact shape of an artifact file name.
pub fn is_valid_name(name: &str) -> bool {
    ARTIFACT_NAME.is_match(name)
}

/// Content type served for an artifact name, keyed by extension.
pub fn content_type_for_name(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Pick an extension: the hint's own extension if known, else one mapped
/// from the media type, else [`FALLBACK_EXTENSION`].
pub fn derive_extension(name_hint: Option<&str>, media_type: &str) -> String {
    let from_hint = name_hint
        .and_then(|hint| {
            let last = hint.rsplit(['/', '\\']).next().unwrap_or(hint);
            let last = last.split(['?', '#']).next().unwrap_or(last);
            last.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
        })
        .filter(|ext| ext != "bin" && KNOWN_EXTENSIONS.contains(&ext.as_str()));
    if let Some(ext) = from_hint {
        return format!(".{ext}");
    }
    extension_for_media_type(media_type)
        .unwrap_or(FALLBACK_EXTENSION)
        .to_string()
}

fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    match essence(media_type).as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/webp" => Some(".webp"),
        "image/gif" => Some(".gif"),
        _ => None,
    }
}

/// 128 bits from the OS CSPRNG, hex encoded.
fn generate_id() -> Result<String, MediaError> {
    let mut bytes = [0u8; ID_BYTES];
    getrandom::fill(&mut bytes)
        .map_err(|e| MediaError::StorageWriteFailed(format!("random id generation failed: {e}")))?;
    Ok(hex::encode(bytes))
}

async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(media_type: &str, bytes: &'static [u8], hint: Option<&str>) -> DecodedMedia {
        DecodedMedia {
            media_type: media_type.to_string(),
            bytes: Bytes::from_static(bytes),
            name_hint: hint.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_store_then_retrieve_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::open(tmp.path().join("uploads"), "https://img.example/")
            .await
            .unwrap();

        let artifact = store
            .store(&media("image/png", b"\x89PNG fake", None))
            .await
            .unwrap();
        assert_eq!(artifact.id.len(), 32);
        assert!(artifact.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(artifact.extension, ".png");
        assert_eq!(
            artifact.public_url,
            format!("https://img.example/files/{}.png", artifact.id)
        );
        assert_eq!(artifact.size, 9);

        let file = store.retrieve(&artifact.file_name()).await.unwrap();
        assert_eq!(file.bytes.as_ref(), b"\x89PNG fake");
        assert_eq!(file.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_store_generates_distinct_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::open(tmp.path(), "https://img.example").await.unwrap();
        let a = store.store(&media("image/gif", b"GIF89a", None)).await.unwrap();
        let b = store.store(&media("image/gif", b"GIF89a", None)).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_store_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::open(tmp.path(), "https://img.example").await.unwrap();
        store.store(&media("image/webp", b"RIFF", None)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(is_valid_name(&names[0]), "unexpected file {}", names[0]);
    }

    #[tokio::test]
    async fn test_retrieve_rejects_traversal_without_touching_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let secret = tmp.path().join("0123456789abcdef0123456789abcdef.png");
        std::fs::write(&secret, b"outside").unwrap();
        let store = ContentStore::open(tmp.path().join("uploads"), "https://img.example")
            .await
            .unwrap();

        for name in [
            "../0123456789abcdef0123456789abcdef.png",
            "..%2F0123456789abcdef0123456789abcdef.png",
            "/etc/passwd",
            "",
            ".",
            "0123456789ABCDEF0123456789ABCDEF.png",
            "0123456789abcdef0123456789abcdef.exe",
            "0123456789abcdef0123456789abcdef",
        ] {
            assert_eq!(
                store.retrieve(name).await.unwrap_err(),
                MediaError::NotFound,
                "name {name:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_retrieve_well_formed_but_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::open(tmp.path(), "https://img.example").await.unwrap();
        let err = store
            .retrieve("ffffffffffffffffffffffffffffffff.jpg")
            .await
            .unwrap_err();
        assert_eq!(err, MediaError::NotFound);
    }

    #[tokio::test]
    async fn test_open_creates_nested_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("b");
        let store = ContentStore::open(&dir, "https://img.example").await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("0123456789abcdef0123456789abcdef.jpg"));
        assert!(is_valid_name("0123456789abcdef0123456789abcdef.bin"));
        assert!(!is_valid_name("0123456789abcdef0123456789abcde.jpg"));
        assert!(!is_valid_name("0123456789abcdef0123456789abcdef.jpg/"));
        assert!(!is_valid_name("0123456789abcdef0123456789abcdef.jpg\n"));
    }

    #[test]
    fn test_derive_extension() {
        assert_eq!(derive_extension(Some("cat.JPG"), "image/png"), ".jpg");
        assert_eq!(derive_extension(Some("https://x.io/a/b.webp?w=1"), "image/png"), ".webp");
        assert_eq!(derive_extension(Some("photo.heic"), "image/png"), ".png");
        assert_eq!(derive_extension(Some("noext"), "image/jpeg"), ".jpg");
        assert_eq!(derive_extension(None, "image/gif; x=y"), ".gif");
        assert_eq!(derive_extension(None, "image/tiff"), ".bin");
        assert_eq!(derive_extension(Some("weird.bin"), "image/png"), ".png");
    }

    #[test]
    fn test_content_type_for_name() {
        assert_eq!(content_type_for_name("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for_name("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for_name("a.png"), "image/png");
        assert_eq!(content_type_for_name("a.webp"), "image/webp");
        assert_eq!(content_type_for_name("a.gif"), "image/gif");
        assert_eq!(content_type_for_name("a.bin"), "application/octet-stream");
        assert_eq!(content_type_for_name("noext"), "application/octet-stream");
    }
}

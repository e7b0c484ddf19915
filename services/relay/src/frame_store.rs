//! Durable frame storage.
//!
//! Frames live as flat files under a root directory, one file per key:
//! ```text
//! {root_dir}/
//!   image_20240101_120000.jpg
//!   image_20240101_120001.jpg
//! ```
//!
//! A `put` is fully flushed before it returns, and a concurrent `get` sees
//! either the previous blob for that key or the complete new one.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Errors that can occur during frame store operations.
#[derive(Debug, Error)]
pub enum FrameStoreError {
    #[error("Frame not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameStoreError>;

/// Byte-addressable frame storage keyed by filename.
#[async_trait]
pub trait FrameStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing blob.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch the blob stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Check that a key names a single plain file inside the root.
///
/// Anything that could escape the root or address a hidden file is refused.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('.')
        || key.contains("..")
        || key.contains(['/', '\\', '\0'])
        || Path::new(key).is_absolute();

    if invalid {
        return Err(FrameStoreError::InvalidKey(key.to_string()));
    }

    Ok(())
}

/// Filesystem-backed frame store.
pub struct FilesystemFrameStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FilesystemFrameStore {
    /// Create a new filesystem frame store.
    ///
    /// Creates the root directory if it doesn't exist.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        debug!(root = %root.display(), "Frame store ready");

        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    // Leading dot keeps in-flight files out of reach of `get`.
    fn temp_path_for_key(&self, key: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{}.{}.{}.tmp", key, std::process::id(), n))
    }
}

#[async_trait]
impl FrameStore for FilesystemFrameStore {
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        validate_key(key)?;

        let path = self.path_for_key(key);
        let temp_path = self.temp_path_for_key(key);

        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), "Stored frame");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        if validate_key(key).is_err() {
            return Err(FrameStoreError::NotFound(key.to_string()));
        }

        match fs::read(self.path_for_key(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FrameStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Content type for a stored frame, from its extension
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());

    match ext.as_deref() {
        Some("jpeg" | "jpg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_temp_store() -> (FilesystemFrameStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemFrameStore::new(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _temp) = create_temp_store().await;
        let frame = b"\xff\xd8\xff\xe0 jpeg bytes \xff\xd9";

        store.put("image_20240101_120000.jpg", frame).await.unwrap();

        let retrieved = store.get("image_20240101_120000.jpg").await.unwrap();
        assert_eq!(retrieved, frame);
    }

    #[tokio::test]
    async fn test_creates_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("uploads");

        let store = FilesystemFrameStore::new(&root).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_key() {
        let (store, _temp) = create_temp_store().await;

        store.put("image_20240101_120000.jpg", b"first").await.unwrap();
        store.put("image_20240101_120000.jpg", b"second").await.unwrap();

        let retrieved = store.get("image_20240101_120000.jpg").await.unwrap();
        assert_eq!(retrieved, b"second");
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (store, temp) = create_temp_store().await;

        store.put("image_20240101_120000.jpg", b"frame").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["image_20240101_120000.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let (store, _temp) = create_temp_store().await;

        let result = store.get("does-not-exist.jpg").await;
        assert!(matches!(result, Err(FrameStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_traversal_is_not_found() {
        let (store, temp) = create_temp_store().await;
        std::fs::write(temp.path().join("secret.txt"), b"secret").unwrap();

        for key in ["../secret.txt", "..", "sub/../secret.txt", "/etc/passwd", "..\\secret.txt", ".secret"] {
            let result = store.get(key).await;
            assert!(
                matches!(result, Err(FrameStoreError::NotFound(_))),
                "key {key:?} should not resolve"
            );
        }
    }

    #[tokio::test]
    async fn test_put_rejects_invalid_key() {
        let (store, _temp) = create_temp_store().await;

        let result = store.put("../escape.jpg", b"frame").await;
        assert!(matches!(result, Err(FrameStoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_key_leave_one_complete_blob() {
        let (store, _temp) = create_temp_store().await;
        let store = Arc::new(store);

        let payloads: Vec<Vec<u8>> = (0..16u8).map(|i| vec![i; 64 * 1024]).collect();

        let handles: Vec<_> = payloads
            .iter()
            .cloned()
            .map(|payload| {
                let store = store.clone();
                tokio::spawn(async move { store.put("image_20240101_120000.jpg", &payload).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get("image_20240101_120000.jpg").await.unwrap();
        assert!(payloads.contains(&stored));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("image_20240101_120000.jpg").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a/b.jpg").is_err());
        assert!(validate_key("a..b.jpg").is_err());
        assert!(validate_key("nul\0.jpg").is_err());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("image_20240101_120000.jpg"), "image/jpeg");
        assert_eq!(content_type_for("frame.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("frame.png"), "image/png");
        assert_eq!(content_type_for("frame"), "application/octet-stream");
    }
}

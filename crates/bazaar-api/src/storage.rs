use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::info;

use bazaar_types::api::ObjectRef;

use crate::error::ApiError;

/// 5 MiB upload limit for images
pub const MAX_OBJECT_SIZE: usize = 5 * 1024 * 1024;

pub const BUCKETS: &[&str] = &["listings", "profiles"];

const MAX_PATH_LEN: usize = 512;

/// Public object storage on local disk.
///
/// Each object lives at `{dir}/{bucket}/{path}` and is served unauthenticated
/// under `{public_url}/storage/{bucket}/{path}`. Writing to an existing path
/// replaces the object.
pub struct Storage {
    dir: PathBuf,
    public_url: String,
}

impl Storage {
    pub async fn new(dir: PathBuf, public_url: &str) -> anyhow::Result<Self> {
        for bucket in BUCKETS {
            fs::create_dir_all(dir.join(bucket)).await?;
        }
        info!("Object storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> Result<String, ApiError> {
        check_bucket(bucket)?;
        check_path(path)?;
        Ok(format!("{}/storage/{}/{}", self.public_url, bucket, path))
    }

    pub async fn upload(&self, bucket: &str, path: &str, data: &[u8]) -> Result<ObjectRef, ApiError> {
        if data.is_empty() {
            return Err(ApiError::InvalidInput("empty upload".into()));
        }
        if data.len() > MAX_OBJECT_SIZE {
            return Err(ApiError::PayloadTooLarge {
                size: data.len(),
                max: MAX_OBJECT_SIZE,
            });
        }

        let file_path = self.object_path(bucket, path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        fs::write(&file_path, data).await.map_err(io_error)?;

        let sha256 = hex::encode(Sha256::digest(data));
        info!("Stored {}/{} ({} bytes)", bucket, path, data.len());

        Ok(ObjectRef {
            bucket: bucket.to_string(),
            path: path.to_string(),
            url: self.public_url(bucket, path)?,
            sha256,
            size: data.len() as u64,
        })
    }

    pub async fn read(&self, bucket: &str, path: &str) -> Result<Vec<u8>, ApiError> {
        let file_path = self.object_path(bucket, path)?;
        match fs::read(&file_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::NotFound),
            Err(e) => Err(io_error(e)),
        }
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf, ApiError> {
        check_bucket(bucket)?;
        check_path(path)?;
        Ok(self.dir.join(bucket).join(Path::new(path)))
    }
}

fn check_bucket(bucket: &str) -> Result<(), ApiError> {
    if BUCKETS.contains(&bucket) {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}

/// Relative, slash-separated, no dot segments, a conservative character set.
fn check_path(path: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::InvalidInput(format!("invalid object path '{}'", path));

    if path.is_empty() || path.len() > MAX_PATH_LEN {
        return Err(invalid());
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Content type from the file extension.
pub fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn io_error(e: std::io::Error) -> ApiError {
    ApiError::Transient(format!("storage I/O error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), "http://localhost:3000/")
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn upload_then_read() {
        let (_dir, storage) = storage().await;
        let obj = storage.upload("profiles", "u1/profile.png", b"png-bytes").await.unwrap();

        assert_eq!(obj.url, "http://localhost:3000/storage/profiles/u1/profile.png");
        assert_eq!(obj.size, 9);
        assert_eq!(obj.sha256.len(), 64);
        assert_eq!(storage.read("profiles", "u1/profile.png").await.unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn upload_replaces_existing_object() {
        let (_dir, storage) = storage().await;
        storage.upload("profiles", "u1/profile.png", b"old").await.unwrap();
        storage.upload("profiles", "u1/profile.png", b"new").await.unwrap();
        assert_eq!(storage.read("profiles", "u1/profile.png").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn rejects_traversal_and_unknown_buckets() {
        let (_dir, storage) = storage().await;
        for bad in ["../secret", "a/../../b", "/abs", "a//b", "sp ace.png", ""] {
            assert!(
                matches!(storage.upload("listings", bad, b"x").await, Err(ApiError::InvalidInput(_))),
                "{bad} should be rejected"
            );
        }
        assert!(matches!(storage.upload("avatars", "a.png", b"x").await, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn enforces_size_cap() {
        let (_dir, storage) = storage().await;
        let big = vec![0u8; MAX_OBJECT_SIZE + 1];
        assert!(matches!(
            storage.upload("listings", "big.png", &big).await,
            Err(ApiError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (_dir, storage) = storage().await;
        assert!(matches!(storage.read("listings", "nope.png").await, Err(ApiError::NotFound)));
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type("a/b.JPG"), "image/jpeg");
        assert_eq!(content_type("x.webp"), "image/webp");
        assert_eq!(content_type("noext"), "application/octet-stream");
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs as tfs, io::AsyncWriteExt};
use util::{config::AppConfig, paths};

/// Characters left alone when building a public reference, matching
/// JavaScript's `encodeURIComponent`.
const KEY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedArtifact {
    pub storage_key: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("no object stored under `{0}`")]
    NotFound(String),
    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store timed out after {0:?}")]
    Timeout(Duration),
    #[error("archive unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Wording shown to the submitter. Never includes storage details.
    pub fn summary(&self) -> &'static str {
        match self {
            StoreError::Timeout(_) => "Storing your file timed out. Please try again later.",
            _ => "Your file could not be stored. Please try again later.",
        }
    }
}

/// Durable object storage addressed by key.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Copy the file at `source` into the store under `key`.
    async fn put(&self, key: &str, source: &Path) -> Result<ArchivedArtifact, StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Reference handed to the submitter for a stored object.
    fn public_reference(&self, key: &str) -> String;
}

/// `<file_name>-<UTC timestamp without separators>`, e.g.
/// `hw1.zip-20240131235959123Z`.
pub fn storage_key(file_name: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", file_name, at.format("%Y%m%d%H%M%S%3fZ"))
}

/// `<bucket>/<percent-encoded key>`.
pub fn public_reference(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, utf8_percent_encode(key, KEY_COMPONENT))
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
        || key.ends_with(".partial");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Archive backed by a directory per bucket under the storage root.
#[derive(Debug, Clone)]
pub struct LocalArchiveStore {
    bucket: String,
    dir: PathBuf,
}

impl LocalArchiveStore {
    pub fn new(storage_root: &str, bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            dir: paths::bucket_dir(storage_root, bucket),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.storage_root, &config.archive_bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        validate_key(key).is_ok() && tfs::try_exists(self.object_path(key)).await.unwrap_or(false)
    }
}

#[async_trait]
impl ArchiveStore for LocalArchiveStore {
    async fn put(&self, key: &str, source: &Path) -> Result<ArchivedArtifact, StoreError> {
        validate_key(key)?;
        tfs::create_dir_all(&self.dir).await?;

        // Readers never see a half-written object. The staged file is removed
        // when this future is dropped, including on a store timeout.
        let final_path = self.object_path(key);
        let staged = tempfile::Builder::new()
            .prefix(&format!(".{key}."))
            .suffix(".partial")
            .tempfile_in(&self.dir)?;

        let mut dest = tfs::File::from_std(staged.as_file().try_clone()?);
        let mut src = tfs::File::open(source).await?;
        let size_bytes = tokio::io::copy(&mut src, &mut dest).await?;
        dest.flush().await?;
        dest.sync_all().await?;
        drop(dest);

        staged
            .persist(&final_path)
            .map_err(|e| StoreError::Io(e.error))?;

        Ok(ArchivedArtifact {
            storage_key: key.to_string(),
            size_bytes,
            stored_at: Utc::now(),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        validate_key(key)?;
        match tfs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn public_reference(&self, key: &str) -> String {
        public_reference(&self.bucket, key)
    }
}

use async_trait::async_trait;
use futures_util::StreamExt;
use percent_encoding::percent_decode_str;
use reqwest::{Client, Url, redirect};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs as tfs, io::AsyncWriteExt};

/// Used when the URL path has no usable last segment.
pub const FALLBACK_FILE_NAME: &str = "submission";

/// An artifact downloaded into scratch space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub path: PathBuf,
    /// Original file name taken from the URL.
    pub file_name: String,
    pub size_bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid artifact URL `{0}`")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// Wording shown to the submitter. Never includes transport or I/O details.
    pub fn summary(&self) -> String {
        match self {
            FetchError::InvalidUrl(_) => {
                "The submission URL is not a valid http or https address.".to_string()
            }
            FetchError::Transport(_) => "The submission URL could not be reached.".to_string(),
            FetchError::Status(code) => {
                format!("The submission URL responded with HTTP status {code}.")
            }
            FetchError::Io(_) => "Your file could not be prepared for archiving.".to_string(),
            FetchError::Timeout(_) => "Downloading your file timed out.".to_string(),
        }
    }
}

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` into `dest_dir`, returning where it landed.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchedArtifact, FetchError>;
}

/// Streams artifacts over HTTP(S) straight to disk.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("submission-pipeline/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchedArtifact, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let file_name = file_name_from_url(&parsed);
        let path = dest_dir.join(&file_name);

        let resp = self.client.get(parsed).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = tfs::File::create(&path).await?;
        let mut size_bytes = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(FetchedArtifact {
            path,
            file_name,
            size_bytes,
        })
    }
}

/// Last path segment of `url`, percent-decoded and safe to use as a file name.
pub fn file_name_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let cleaned: String = decoded
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0') && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(url: &str) -> String {
        file_name_from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn summary_hides_io_detail() {
        let err = FetchError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "Permission denied (os error 13)",
        ));
        assert!(!err.summary().contains("os error"));
        assert_eq!(
            FetchError::Status(404).summary(),
            "The submission URL responded with HTTP status 404."
        );
    }

    #[test]
    fn takes_last_segment() {
        assert_eq!(name("https://example.com/files/hw1.zip"), "hw1.zip");
        assert_eq!(name("https://example.com/hw1.zip?download=1"), "hw1.zip");
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(name("https://example.com/my%20work.zip"), "my work.zip");
        assert_eq!(name("https://example.com/a%2Fb.zip"), "ab.zip");
    }

    #[test]
    fn falls_back_without_a_name() {
        assert_eq!(name("https://example.com/"), FALLBACK_FILE_NAME);
        assert_eq!(name("https://example.com"), FALLBACK_FILE_NAME);
        assert_eq!(name("https://example.com/dir/%2E%2E"), FALLBACK_FILE_NAME);
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let fetcher = HttpFetcher::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher.fetch("file:///etc/passwd", dir.path()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
        let err = fetcher.fetch("not a url", dir.path()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}

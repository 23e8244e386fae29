//! Object-store download client for model artifacts.
//!
//! Speaks the Google Cloud Storage JSON API media endpoint. The endpoint is
//! configurable so tests (and emulators) can point it at a local server.
//! Requests are authorized with Application Default Credentials unless a
//! static token or anonymous access is configured.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::Url;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const READ_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_only";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid storage endpoint: {0}")]
    Endpoint(String),
    #[error("failed to obtain Google credentials: {0}")]
    Auth(#[from] gcp_auth::Error),
}

impl FetchError {
    /// Transport failures and 5xx/429 responses are worth another attempt.
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Server { status, .. } => *status >= 500 || *status == 429,
            Self::Io { .. } | Self::Endpoint(_) | Self::Auth(_) => false,
        }
    }
}

/// Downloads one object from a bucket to a local path.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    /// Fetch `bucket/object` into `dest`, creating parent directories, and
    /// return the path written.
    async fn fetch(&self, bucket: &str, object: &str, dest: &Path) -> Result<PathBuf, FetchError>;
}

/// How requests to the bucket are authorized.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// Application Default Credentials: the metadata server on Cloud Run and
    /// GCE, `GOOGLE_APPLICATION_CREDENTIALS`, or the local gcloud login.
    #[default]
    Default,
    /// A fixed OAuth bearer token.
    Token(String),
    /// No `Authorization` header, for public buckets and emulators.
    Anonymous,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Connection and retry settings for [`GcsFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub endpoint: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: Credentials::Default,
            timeout: Duration::from_secs(30),
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

pub struct GcsFetcher {
    client: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
    /// Resolved on first use so construction never touches the network.
    adc: OnceCell<Arc<dyn TokenProvider>>,
    attempts: u32,
    backoff: Duration,
}

impl GcsFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|e| FetchError::Endpoint(format!("{}: {e}", config.endpoint)))?;
        if endpoint.cannot_be_a_base() {
            return Err(FetchError::Endpoint(config.endpoint));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            credentials: config.credentials,
            adc: OnceCell::new(),
            attempts: config.attempts.max(1),
            backoff: config.backoff,
        })
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{object}?alt=media`, with the
    /// object name encoded as a single path segment.
    fn media_url(&self, bucket: &str, object: &str) -> Result<Url, FetchError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<Option<String>, FetchError> {
        match &self.credentials {
            Credentials::Anonymous => Ok(None),
            Credentials::Token(token) => Ok(Some(token.clone())),
            Credentials::Default => {
                let provider = self.adc.get_or_try_init(gcp_auth::provider).await?;
                let token = provider.token(&[READ_SCOPE]).await?;
                Ok(Some(token.as_str().to_string()))
            }
        }
    }

    async fn download_once(&self, url: &Url, dest: &Path) -> Result<(), FetchError> {
        let mut req = self.client.get(url.clone());
        if let Some(token) = self.bearer_token().await? {
            req = req.bearer_auth(token);
        }
        let mut resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let part = part_path(dest);
        let written = match write_body(&mut resp, &part).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&part, dest)
            .await
            .map_err(|source| FetchError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        debug!(path = %dest.display(), bytes = written, "download complete");
        Ok(())
    }
}

#[async_trait]
impl ObjectFetcher for GcsFetcher {
    async fn fetch(&self, bucket: &str, object: &str, dest: &Path) -> Result<PathBuf, FetchError> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FetchError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let url = self.media_url(bucket, object)?;

        let mut attempt = 1;
        loop {
            info!(bucket, object, attempt, dest = %dest.display(), "downloading artifact");
            match self.download_once(&url, dest).await {
                Ok(()) => return Ok(dest.to_path_buf()),
                Err(e) if attempt < self.attempts && e.is_transient() => {
                    warn!(bucket, object, attempt, error = %e, "download failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Stream the response body into `path`, returning the byte count.
async fn write_body(resp: &mut reqwest::Response, path: &Path) -> Result<usize, FetchError> {
    let io_err = |source: std::io::Error| FetchError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut written = 0;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len();
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}

/// `model.json` → `model.json.part` next to the destination.
fn part_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

//! Object storage: where the service fetches source documents from.
//!
//! [`ObjectStore`] is the seam; [`GcsBucket`] talks to the Google Cloud
//! Storage JSON API over `reqwest`, [`LocalBucket`] treats a directory as a
//! bucket (useful offline and in tests). [`GsUri`] splits a `gs://` URI into
//! its bucket and object name.

use crate::error::ScribeError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public GCS endpoint.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Env var holding an OAuth2 bearer token for GCS.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Env var pointing at a GCS emulator, e.g. `http://localhost:4443`.
pub const EMULATOR_HOST_ENV: &str = "STORAGE_EMULATOR_HOST";

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A single bucket of named objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket name, for logging.
    fn name(&self) -> &str;

    /// Whether the bucket exists and is accessible.
    async fn exists(&self) -> Result<bool, ScribeError>;

    /// Whether `object` exists in the bucket.
    async fn blob_exists(&self, object: &str) -> Result<bool, ScribeError>;

    /// Download `object` to `destination`, creating parent directories.
    async fn download_blob(&self, object: &str, destination: &Path) -> Result<(), ScribeError>;
}

/// A parsed `gs://bucket/object` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsUri {
    pub bucket: String,
    pub object: String,
}

impl GsUri {
    pub const SCHEME: &'static str = "gs://";

    /// Parse `gs://<bucket>/<object>`. Both parts must be non-empty.
    pub fn parse(uri: &str) -> Result<Self, ScribeError> {
        let rest = uri.strip_prefix(Self::SCHEME).ok_or_else(|| {
            ScribeError::InvalidConfiguration(format!("'{uri}': URL must start with 'gs://'"))
        })?;

        match rest.split_once('/') {
            Some((bucket, object)) if !bucket.is_empty() && !object.is_empty() => Ok(Self {
                bucket: bucket.to_string(),
                object: object.to_string(),
            }),
            _ => Err(ScribeError::InvalidConfiguration(format!(
                "'{uri}': expected gs://<bucket>/<object>"
            ))),
        }
    }

    /// Last path segment of the object name.
    pub fn file_name(&self) -> &str {
        self.object.rsplit('/').next().unwrap_or(&self.object)
    }
}

impl std::fmt::Display for GsUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}/{}", Self::SCHEME, self.bucket, self.object)
    }
}

fn storage_error(detail: impl Into<String>) -> ScribeError {
    ScribeError::Storage {
        detail: detail.into(),
    }
}

// ── Google Cloud Storage ────────────────────────────────────────────────────

/// A GCS bucket accessed through the JSON API.
#[derive(Debug, Clone)]
pub struct GcsBucket {
    name: String,
    endpoint: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl GcsBucket {
    /// Bucket on the public endpoint, without credentials.
    pub fn new(name: impl Into<String>) -> Result<Self, ScribeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| storage_error(format!("cannot build HTTP client: {e}")))?;
        let endpoint = Url::parse(DEFAULT_GCS_ENDPOINT)
            .map_err(|e| storage_error(format!("invalid endpoint: {e}")))?;

        Ok(Self {
            name: name.into(),
            endpoint,
            token: None,
            client,
        })
    }

    /// Bucket configured from `GOOGLE_OAUTH_ACCESS_TOKEN` and
    /// `STORAGE_EMULATOR_HOST` when they are set.
    pub fn from_env(name: impl Into<String>) -> Result<Self, ScribeError> {
        let mut bucket = Self::new(name)?;
        if let Ok(host) = std::env::var(EMULATOR_HOST_ENV) {
            if !host.is_empty() {
                bucket = bucket.with_endpoint(&host)?;
            }
        }
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.is_empty() {
                bucket = bucket.with_token(token);
            }
        }
        Ok(bucket)
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, ScribeError> {
        self.endpoint = Url::parse(endpoint)
            .map_err(|e| storage_error(format!("invalid endpoint '{endpoint}': {e}")))?;
        Ok(self)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// `<endpoint>/storage/v1/b/<bucket>/o[/<object>]`, each segment encoded.
    fn objects_url(&self, object: Option<&str>) -> Result<Url, ScribeError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| storage_error(format!("endpoint '{}' cannot be a base", self.endpoint)))?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", self.name.as_str(), "o"]);
            if let Some(object) = object {
                segments.push(object);
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ScribeError> {
        let mut request = self.client.get(url.clone());
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(|e| storage_error(format!("GET {url}: {e}")))
    }
}

#[async_trait]
impl ObjectStore for GcsBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> Result<bool, ScribeError> {
        let mut url = self.objects_url(None)?;
        url.query_pairs_mut().append_pair("maxResults", "1");

        match self.get(url).await {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                warn!(
                    "Bucket '{}' does not exist or is not accessible: HTTP {}",
                    self.name,
                    response.status()
                );
                Ok(false)
            }
            Err(e) => {
                warn!("Bucket '{}' is not reachable: {}", self.name, e);
                Ok(false)
            }
        }
    }

    async fn blob_exists(&self, object: &str) -> Result<bool, ScribeError> {
        let response = self.get(self.objects_url(Some(object))?).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(storage_error(format!(
                "metadata lookup for '{object}' in '{}' failed: HTTP {s}",
                self.name
            ))),
        }
    }

    async fn download_blob(&self, object: &str, destination: &Path) -> Result<(), ScribeError> {
        let mut url = self.objects_url(Some(object))?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.get(url).await?;
        if !response.status().is_success() {
            return Err(storage_error(format!(
                "download of '{object}' from '{}' failed: HTTP {}",
                self.name,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| storage_error(format!("reading '{object}': {e}")))?;
        write_file(destination, &bytes).await?;

        info!(
            "Blob '{}' downloaded from bucket '{}' to '{}'",
            object,
            self.name,
            destination.display()
        );
        Ok(())
    }
}

async fn write_file(destination: &Path, bytes: &[u8]) -> Result<(), ScribeError> {
    let io_error = |source| ScribeError::Io {
        path: destination.to_path_buf(),
        source,
    };
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    tokio::fs::write(destination, bytes).await.map_err(io_error)
}

// ── Local directory ─────────────────────────────────────────────────────────

/// A local directory standing in for a bucket; objects are relative paths.
#[derive(Debug, Clone)]
pub struct LocalBucket {
    name: String,
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self { name, root }
    }

    /// Resolve an object name below the root; `..` and absolute names are rejected.
    fn object_path(&self, object: &str) -> Result<PathBuf, ScribeError> {
        let relative = Path::new(object);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(storage_error(format!("object name '{object}' escapes the bucket")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> Result<bool, ScribeError> {
        Ok(tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn blob_exists(&self, object: &str) -> Result<bool, ScribeError> {
        let path = self.object_path(object)?;
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn download_blob(&self, object: &str, destination: &Path) -> Result<(), ScribeError> {
        let from = self.object_path(object)?;
        let bytes = tokio::fs::read(&from)
            .await
            .map_err(|source| ScribeError::Io { path: from, source })?;
        write_file(destination, &bytes).await?;
        debug!("Copied '{}' to '{}'", object, destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_gs_uri() {
        let uri = GsUri::parse("gs://my-bucket/docs/2024/report.pdf").unwrap();
        assert_eq!(uri.bucket, "my-bucket");
        assert_eq!(uri.object, "docs/2024/report.pdf");
        assert_eq!(uri.file_name(), "report.pdf");
        assert_eq!(uri.to_string(), "gs://my-bucket/docs/2024/report.pdf");
    }

    #[test]
    fn parse_rejects_other_schemes_and_missing_parts() {
        assert!(GsUri::parse("s3://bucket/file.pdf").is_err());
        assert!(GsUri::parse("https://storage.googleapis.com/b/o").is_err());
        assert!(GsUri::parse("gs://bucket").is_err());
        assert!(GsUri::parse("gs://bucket/").is_err());
        assert!(GsUri::parse("gs:///object.pdf").is_err());
    }

    #[test]
    fn gcs_urls_encode_object_names() {
        let bucket = GcsBucket::new("docs")
            .unwrap()
            .with_endpoint("http://localhost:4443/")
            .unwrap();
        let url = bucket.objects_url(Some("a dir/file.pdf")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4443/storage/v1/b/docs/o/a%20dir%2Ffile.pdf"
        );
        assert_eq!(
            bucket.objects_url(None).unwrap().as_str(),
            "http://localhost:4443/storage/v1/b/docs/o"
        );
    }

    #[tokio::test]
    async fn local_bucket_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("in")).unwrap();
        std::fs::write(root.path().join("in/doc.pdf"), b"%PDF-1.7").unwrap();

        let bucket = LocalBucket::new(root.path());
        assert!(bucket.exists().await.unwrap());
        assert!(bucket.blob_exists("in/doc.pdf").await.unwrap());
        assert!(!bucket.blob_exists("in/other.pdf").await.unwrap());

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("nested/copy.pdf");
        bucket.download_blob("in/doc.pdf", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn local_bucket_rejects_escaping_names() {
        let root = tempfile::tempdir().unwrap();
        let bucket = LocalBucket::new(root.path());
        assert!(bucket.blob_exists("../secret.pdf").await.is_err());
        assert!(!LocalBucket::new(root.path().join("missing")).exists().await.unwrap());
    }
}

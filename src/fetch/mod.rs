//! Workbook downloads with an on-disk cache.
//!
//! The last good copy of each URL lives in the raw data directory as a
//! body file plus a JSON sidecar. A cached body is served while it is
//! within the TTL and its checksum still matches; after that the server
//! is asked whether it changed (ETag / Last-Modified) before the body is
//! downloaded again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

/// Leading bytes of a zip archive, which every xlsx file is.
pub const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Content too large: {size} bytes (max {max_size})")]
    ContentTooLarge { size: usize, max_size: usize },

    #[error("{url} did not return a workbook (content type {content_type:?})")]
    UnexpectedContent {
        url: String,
        content_type: Option<String>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where a download's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Network,
    Cache,

    /// Cache confirmed unchanged by the server (HTTP 304)
    Revalidated,
}

#[derive(Debug, Clone)]
pub struct Download {
    pub url: Url,
    pub bytes: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    pub origin: Origin,
}

/// Sidecar describing a cached body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub content_type: Option<String>,
    pub content_length: usize,
    pub sha256: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub cache_dir: PathBuf,

    /// How long a cached body is served without asking the server
    pub cache_ttl: Duration,

    pub max_content_size: usize,
    pub timeout: Duration,
    pub user_agent: String,

    /// Bodies must start with these bytes to be accepted and cached
    pub signature: Option<&'static [u8]>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./data/raw"),
            cache_ttl: Duration::from_secs(3600), // 1 hour
            max_content_size: 50 * 1024 * 1024,   // 50MB
            timeout: Duration::from_secs(60),
            user_agent: format!("agent-dashboard/{}", env!("CARGO_PKG_VERSION")),
            signature: Some(ZIP_SIGNATURE),
        }
    }
}

/// Body and sidecar locations for one URL.
#[derive(Debug, Clone, PartialEq)]
struct CachePaths {
    body: PathBuf,
    meta: PathBuf,
}

impl CachePaths {
    fn for_url(cache_dir: &Path, url: &Url) -> Self {
        let key = url_key(url);
        let ext = extension_for_url(url);
        Self {
            body: cache_dir.join(format!("{}.{}", key, ext)),
            meta: cache_dir.join(format!("{}.meta.json", key)),
        }
    }
}

/// First 8 bytes of the URL's SHA-256, hex encoded.
fn url_key(url: &Url) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    hex::encode(&digest[..8])
}

fn extension_for_url(url: &Url) -> &'static str {
    let path = url.path().to_lowercase();
    if path.ends_with(".xlsx") {
        "xlsx"
    } else if path.ends_with(".zip") {
        "zip"
    } else {
        "bin"
    }
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("agent-dashboard")),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Get `url`, from cache when fresh. `force` skips the freshness check
    /// but still lets the server answer "not modified".
    pub async fn get(&self, url: &Url, force: bool) -> Result<Download, FetchError> {
        let paths = CachePaths::for_url(&self.config.cache_dir, url);
        let cached = self.read_cache(&paths).await;

        if let Some((meta, bytes)) = &cached {
            if !force && self.is_fresh(meta) {
                debug!("Serving {} from cache", url);
                return Ok(Download {
                    url: url.clone(),
                    bytes: bytes.clone(),
                    fetched_at: meta.fetched_at,
                    origin: Origin::Cache,
                });
            }
        }

        self.download(url, &paths, cached).await
    }

    fn is_fresh(&self, meta: &CacheMetadata) -> bool {
        let age = Utc::now().signed_duration_since(meta.fetched_at);
        age.num_seconds() <= self.config.cache_ttl.as_secs() as i64
    }

    /// Cached sidecar and body, if both exist and the body matches its
    /// checksum.
    async fn read_cache(&self, paths: &CachePaths) -> Option<(CacheMetadata, Vec<u8>)> {
        let meta_json = fs::read_to_string(&paths.meta).await.ok()?;
        let meta: CacheMetadata = serde_json::from_str(&meta_json).ok()?;
        let bytes = fs::read(&paths.body).await.ok()?;
        if checksum(&bytes) != meta.sha256 {
            warn!("Cached body {:?} does not match its checksum; ignoring", paths.body);
            return None;
        }
        Some((meta, bytes))
    }

    async fn download(
        &self,
        url: &Url,
        paths: &CachePaths,
        cached: Option<(CacheMetadata, Vec<u8>)>,
    ) -> Result<Download, FetchError> {
        info!("Fetching {}", url);

        let mut request = self.client.get(url.as_str());
        if let Some((meta, _)) = &cached {
            if let Some(etag) = &meta.etag {
                request = request.header(IF_NONE_MATCH, etag.as_str());
            }
            if let Some(modified) = &meta.last_modified {
                request = request.header(IF_MODIFIED_SINCE, modified.as_str());
            }
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            if let Some((mut meta, bytes)) = cached {
                info!("{} not modified since {}", url, meta.fetched_at);
                meta.fetched_at = Utc::now();
                self.write_meta(paths, &meta).await?;
                return Ok(Download {
                    url: url.clone(),
                    bytes,
                    fetched_at: meta.fetched_at,
                    origin: Origin::Revalidated,
                });
            }
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let headers = response.headers();
        let content_type = header_str(headers, CONTENT_TYPE);
        let etag = header_str(headers, ETAG);
        let last_modified = header_str(headers, LAST_MODIFIED);
        if let Some(size) = header_str(headers, CONTENT_LENGTH).and_then(|s| s.parse::<usize>().ok()) {
            self.check_size(size)?;
        }

        let bytes = response.bytes().await?.to_vec();
        self.check_size(bytes.len())?;
        if let Some(signature) = self.config.signature {
            if !bytes.starts_with(signature) {
                return Err(FetchError::UnexpectedContent {
                    url: url.to_string(),
                    content_type,
                });
            }
        }

        let meta = CacheMetadata {
            url: url.to_string(),
            fetched_at: Utc::now(),
            content_type,
            content_length: bytes.len(),
            sha256: checksum(&bytes),
            etag,
            last_modified,
        };
        self.write_body(paths, &bytes).await?;
        self.write_meta(paths, &meta).await?;

        Ok(Download {
            url: url.clone(),
            bytes,
            fetched_at: meta.fetched_at,
            origin: Origin::Network,
        })
    }

    fn check_size(&self, size: usize) -> Result<(), FetchError> {
        if size > self.config.max_content_size {
            return Err(FetchError::ContentTooLarge {
                size,
                max_size: self.config.max_content_size,
            });
        }
        Ok(())
    }

    /// Write through a temp file so readers never see a partial body.
    async fn write_body(&self, paths: &CachePaths, bytes: &[u8]) -> Result<(), FetchError> {
        fs::create_dir_all(&self.config.cache_dir).await?;
        let tmp = paths.body.with_extension("part");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &paths.body).await?;
        Ok(())
    }

    async fn write_meta(&self, paths: &CachePaths, meta: &CacheMetadata) -> Result<(), FetchError> {
        fs::create_dir_all(&self.config.cache_dir).await?;
        fs::write(&paths.meta, serde_json::to_string_pretty(meta)?).await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{header, HeaderMap as RequestHeaders, StatusCode as ServerStatus};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use tempfile::TempDir;

    use super::test_server::serve;
    use super::*;

    const LAST_MODIFIED_AT: &str = "Tue, 01 Oct 2024 00:00:00 GMT";

    /// Conditional headers seen by the server, one entry per request.
    type Seen = Arc<Mutex<Vec<(Option<String>, Option<String>)>>>;

    async fn conditional_workbook(State(seen): State<Seen>, headers: RequestHeaders) -> Response {
        let value = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let etag = value(header::IF_NONE_MATCH);
        let modified = value(header::IF_MODIFIED_SINCE);
        seen.lock().unwrap().push((etag.clone(), modified));

        if etag.as_deref() == Some("\"v1\"") {
            return ServerStatus::NOT_MODIFIED.into_response();
        }
        (
            [(header::ETAG, "\"v1\""), (header::LAST_MODIFIED, LAST_MODIFIED_AT)],
            b"PK\x03\x04workbook".to_vec(),
        )
            .into_response()
    }

    async fn test_site() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let router = Router::new()
            .route("/book.xlsx", get(conditional_workbook))
            .route("/page.xlsx", get(|| async { "<html>sign in</html>" }))
            .route("/big.xlsx", get(|| async { vec![b'P'; 4096] }))
            .with_state(seen.clone());
        (serve(router).await, seen)
    }

    fn site_url(base: &str, path: &str) -> Url {
        Url::parse(&format!("{}{}", base, path)).unwrap()
    }

    // Nothing listens on the discard port; any network access fails.
    const OFFLINE_URL: &str = "http://127.0.0.1:9/AP%20Final.xlsx";

    fn test_config(temp_dir: &TempDir) -> FetcherConfig {
        FetcherConfig {
            cache_dir: temp_dir.path().to_path_buf(),
            cache_ttl: Duration::from_secs(3600),
            max_content_size: 1024 * 1024,
            timeout: Duration::from_secs(5),
            user_agent: "test-agent".to_string(),
            signature: Some(ZIP_SIGNATURE),
        }
    }

    fn seed_cache(dir: &Path, url: &Url, body: &[u8], age: chrono::Duration, sha256: Option<String>) {
        let paths = CachePaths::for_url(dir, url);
        std::fs::write(&paths.body, body).unwrap();
        let meta = CacheMetadata {
            url: url.to_string(),
            fetched_at: Utc::now() - age,
            content_type: None,
            content_length: body.len(),
            sha256: sha256.unwrap_or_else(|| checksum(body)),
            etag: Some("\"abc\"".to_string()),
            last_modified: None,
        };
        std::fs::write(&paths.meta, serde_json::to_string(&meta).unwrap()).unwrap();
    }

    #[test]
    fn test_url_key() {
        let a = Url::parse("https://example.com/a.xlsx").unwrap();
        let b = Url::parse("https://example.com/b.xlsx").unwrap();
        assert_ne!(url_key(&a), url_key(&b));
        assert_eq!(url_key(&a).len(), 16);
    }

    #[test]
    fn test_cache_paths() {
        let url = Url::parse("https://raw.githubusercontent.com/x/y/main/AP%20Final.xlsx").unwrap();
        let paths = CachePaths::for_url(Path::new("/data/raw"), &url);
        assert!(paths.body.starts_with("/data/raw"));
        assert_eq!(paths.body.extension().unwrap(), "xlsx");
        assert!(paths.meta.to_string_lossy().ends_with(".meta.json"));

        let other = Url::parse("https://example.com/download").unwrap();
        assert_eq!(CachePaths::for_url(Path::new("/d"), &other).body.extension().unwrap(), "bin");
    }

    #[tokio::test]
    async fn test_fresh_cache_is_served_offline() {
        let dir = TempDir::new().unwrap();
        let url = Url::parse(OFFLINE_URL).unwrap();
        seed_cache(dir.path(), &url, b"PK\x03\x04cached", chrono::Duration::zero(), None);

        let fetcher = Fetcher::new(test_config(&dir)).unwrap();
        let download = fetcher.get(&url, false).await.unwrap();
        assert_eq!(download.origin, Origin::Cache);
        assert_eq!(download.bytes, b"PK\x03\x04cached");
    }

    #[tokio::test]
    async fn test_expired_or_forced_goes_to_network() {
        let dir = TempDir::new().unwrap();
        let url = Url::parse(OFFLINE_URL).unwrap();
        let fetcher = Fetcher::new(test_config(&dir)).unwrap();

        seed_cache(dir.path(), &url, b"PK\x03\x04old", chrono::Duration::hours(2), None);
        assert!(matches!(fetcher.get(&url, false).await, Err(FetchError::Http(_))));

        seed_cache(dir.path(), &url, b"PK\x03\x04new", chrono::Duration::zero(), None);
        assert!(fetcher.get(&url, true).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_ignored() {
        let dir = TempDir::new().unwrap();
        let url = Url::parse(OFFLINE_URL).unwrap();
        seed_cache(
            dir.path(),
            &url,
            b"PK\x03\x04cached",
            chrono::Duration::zero(),
            Some("0".repeat(64)),
        );

        let fetcher = Fetcher::new(test_config(&dir)).unwrap();
        assert!(fetcher.get(&url, false).await.is_err());
    }

    #[test]
    fn test_size_limit() {
        let dir = TempDir::new().unwrap();
        let fetcher = Fetcher::new(test_config(&dir)).unwrap();
        assert!(fetcher.check_size(1024).is_ok());
        assert!(matches!(
            fetcher.check_size(2 * 1024 * 1024),
            Err(FetchError::ContentTooLarge { .. })
        ));
    }

    #[test]
    fn test_fetcher_config_default() {
        let config = FetcherConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from("./data/raw"));
        assert_eq!(config.signature, Some(ZIP_SIGNATURE));
        assert!(config.user_agent.starts_with("agent-dashboard/"));
    }

    #[tokio::test]
    async fn test_download_then_revalidate() {
        let dir = TempDir::new().unwrap();
        let (base, seen) = test_site().await;
        let url = site_url(&base, "/book.xlsx");
        let fetcher = Fetcher::new(test_config(&dir)).unwrap();

        let first = fetcher.get(&url, false).await.unwrap();
        assert_eq!(first.origin, Origin::Network);
        assert_eq!(first.bytes, b"PK\x03\x04workbook");

        let paths = CachePaths::for_url(dir.path(), &url);
        let meta: CacheMetadata =
            serde_json::from_str(&std::fs::read_to_string(&paths.meta).unwrap()).unwrap();
        assert_eq!(meta.etag.as_deref(), Some("\"v1\""));
        assert_eq!(meta.last_modified.as_deref(), Some(LAST_MODIFIED_AT));
        assert_eq!(meta.sha256, checksum(&first.bytes));

        // Fresh cache: no request at all
        assert_eq!(fetcher.get(&url, false).await.unwrap().origin, Origin::Cache);
        assert_eq!(seen.lock().unwrap().len(), 1);

        let second = fetcher.get(&url, true).await.unwrap();
        assert_eq!(second.origin, Origin::Revalidated);
        assert_eq!(second.bytes, first.bytes);
        assert!(second.fetched_at >= first.fetched_at);

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], (None, None));
        assert_eq!(
            requests[1],
            (Some("\"v1\"".to_string()), Some(LAST_MODIFIED_AT.to_string()))
        );

        let rewritten: CacheMetadata =
            serde_json::from_str(&std::fs::read_to_string(&paths.meta).unwrap()).unwrap();
        assert_eq!(rewritten.fetched_at, second.fetched_at);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let dir = TempDir::new().unwrap();
        let (base, _) = test_site().await;
        let fetcher = Fetcher::new(test_config(&dir)).unwrap();

        let err = fetcher.get(&site_url(&base, "/missing.xlsx"), false).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_non_zip_body_is_rejected_and_not_cached() {
        let dir = TempDir::new().unwrap();
        let (base, _) = test_site().await;
        let url = site_url(&base, "/page.xlsx");
        let fetcher = Fetcher::new(test_config(&dir)).unwrap();

        let err = fetcher.get(&url, false).await.unwrap_err();
        match err {
            FetchError::UnexpectedContent { content_type, .. } => {
                assert!(content_type.unwrap().starts_with("text/plain"));
            }
            other => panic!("expected UnexpectedContent, got {:?}", other),
        }
        assert!(!CachePaths::for_url(dir.path(), &url).body.exists());
    }

    #[tokio::test]
    async fn test_signature_check_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let (base, _) = test_site().await;
        let mut config = test_config(&dir);
        config.signature = None;
        let fetcher = Fetcher::new(config).unwrap();

        let download = fetcher.get(&site_url(&base, "/page.xlsx"), false).await.unwrap();
        assert_eq!(download.bytes, b"<html>sign in</html>");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (base, _) = test_site().await;
        let mut config = test_config(&dir);
        config.max_content_size = 1024;
        let fetcher = Fetcher::new(config).unwrap();

        let err = fetcher.get(&site_url(&base, "/big.xlsx"), false).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::ContentTooLarge { size: 4096, max_size: 1024 }
        ));
    }
}

//! Workbook sources.
//!
//! The dataset only needs "the workbook bytes"; where they come from is a
//! [`WorkbookSource`]: a remote URL through the caching [`Fetcher`], a local
//! file, or bytes held in memory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::config::AppConfig;
use crate::fetch::{FetchError, Fetcher, FetcherConfig};

/// Something that can produce the contract workbook.
#[async_trait]
pub trait WorkbookSource: Send + Sync {
    /// Load the workbook. `force` bypasses any cache the source keeps.
    async fn load(&self, force: bool) -> Result<Vec<u8>, FetchError>;

    /// Human-readable origin, for logs and status output.
    fn describe(&self) -> String;
}

/// Workbook downloaded over HTTP(S).
pub struct HttpWorkbookSource {
    fetcher: Fetcher,
    url: Url,
}

impl HttpWorkbookSource {
    pub fn new(fetcher: Fetcher, url: Url) -> Self {
        Self { fetcher, url }
    }
}

#[async_trait]
impl WorkbookSource for HttpWorkbookSource {
    async fn load(&self, force: bool) -> Result<Vec<u8>, FetchError> {
        let download = self.fetcher.get(&self.url, force).await?;
        info!(
            "Workbook {} ({} bytes, {:?}, fetched {})",
            self.url,
            download.bytes.len(),
            download.origin,
            download.fetched_at
        );
        Ok(download.bytes)
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Workbook read from the local filesystem.
pub struct FileWorkbookSource {
    path: PathBuf,
}

impl FileWorkbookSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl WorkbookSource for FileWorkbookSource {
    async fn load(&self, _force: bool) -> Result<Vec<u8>, FetchError> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Workbook bytes held in memory.
pub struct MemoryWorkbookSource {
    bytes: Vec<u8>,
}

impl MemoryWorkbookSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

#[async_trait]
impl WorkbookSource for MemoryWorkbookSource {
    async fn load(&self, _force: bool) -> Result<Vec<u8>, FetchError> {
        Ok(self.bytes.clone())
    }

    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.bytes.len())
    }
}

/// Select the workbook source described by `config`: a local path when
/// one is set, otherwise the configured URL.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn WorkbookSource>, FetchError> {
    if let Some(path) = &config.source.workbook_path {
        return Ok(Arc::new(FileWorkbookSource::new(path.clone())));
    }

    let url = Url::parse(&config.source.workbook_url)
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", config.source.workbook_url, e)))?;
    let fetcher = Fetcher::new(FetcherConfig {
        cache_dir: config.raw_dir(),
        cache_ttl: config.source.cache_ttl().unwrap_or(Duration::from_secs(3600)),
        timeout: Duration::from_secs(config.source.timeout_seconds),
        ..Default::default()
    })?;
    Ok(Arc::new(HttpWorkbookSource::new(fetcher, url)))
}

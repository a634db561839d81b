//! Player headshot lookup.
//!
//! Indexes a directory of images by normalized file stem. The directory is
//! either configured directly or filled once from a zip archive fetched
//! through the workbook [`Fetcher`]. Any failure leaves an empty index, so
//! every player falls back to the placeholder image.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use zip::ZipArchive;

use crate::config::AppConfig;
use crate::fetch::{FetchError, Fetcher, FetcherConfig, ZIP_SIGNATURE};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Archives are large image bundles; allow more than a workbook.
const MAX_ARCHIVE_SIZE: usize = 200 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum HeadshotError {
    #[error("Headshot archive download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Headshot archive is not a zip file")]
    InvalidSignature,

    #[error("Headshot archive could not be extracted: {0}")]
    Extract(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Unpack the images in a zip archive into `dest`, flattening any folders.
/// Entries whose path escapes the archive root are skipped. Returns the
/// number of images written.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<usize, HeadshotError> {
    if !bytes.starts_with(ZIP_SIGNATURE) {
        return Err(HeadshotError::InvalidSignature);
    }
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    std::fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(path) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive entry {:?}", entry.name());
            continue;
        };
        let Some(file_name) = path.file_name() else { continue };
        if !is_image(&path) {
            continue;
        }
        let mut out = std::fs::File::create(dest.join(file_name))?;
        std::io::copy(&mut entry, &mut out)?;
        written += 1;
    }
    debug!("Extracted {} headshots into {:?}", written, dest);
    Ok(written)
}

/// Download the archive at `url` and extract it into `dest`, unless `dest`
/// already holds images from an earlier run.
pub async fn fetch_archive(fetcher: &Fetcher, url: &Url, dest: &Path) -> Result<usize, HeadshotError> {
    if dest.is_dir() {
        let existing = HeadshotIndex::scan(dest);
        if !existing.is_empty() {
            debug!("Headshots already extracted in {:?}", dest);
            return Ok(existing.len());
        }
    }

    let download = fetcher.get(url, false).await.map_err(|e| match e {
        FetchError::UnexpectedContent { .. } => HeadshotError::InvalidSignature,
        other => HeadshotError::Fetch(other),
    })?;
    extract_archive(&download.bytes, dest)
}

/// Build the headshot index for `config`: the configured directory, else
/// the extracted archive, else nothing.
pub async fn load(config: &AppConfig) -> HeadshotIndex {
    if let Some(dir) = &config.headshots.dir {
        return HeadshotIndex::scan(dir);
    }
    let Some(archive_url) = &config.headshots.archive_url else {
        return HeadshotIndex::default();
    };

    let dest = config.headshots_dir();
    match prepare_archive(config, archive_url, &dest).await {
        Ok(count) => {
            info!("{} headshots available from {}", count, archive_url);
            HeadshotIndex::scan(&dest)
        }
        Err(e) => {
            warn!("Headshots unavailable, using placeholders: {}", e);
            HeadshotIndex::default()
        }
    }
}

async fn prepare_archive(config: &AppConfig, archive_url: &str, dest: &Path) -> Result<usize, HeadshotError> {
    let url = Url::parse(archive_url)
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", archive_url, e)))?;
    let fetcher = Fetcher::new(FetcherConfig {
        cache_dir: config.raw_dir(),
        max_content_size: MAX_ARCHIVE_SIZE,
        timeout: Duration::from_secs(config.source.timeout_seconds),
        signature: Some(ZIP_SIGNATURE),
        ..Default::default()
    })?;
    fetch_archive(&fetcher, &url, dest).await
}

/// Images keyed by normalized player name.
#[derive(Debug, Clone, Default)]
pub struct HeadshotIndex {
    root: Option<PathBuf>,
    images: BTreeMap<String, PathBuf>,
}

impl HeadshotIndex {
    /// Index every image directly under `dir`. An unreadable directory
    /// yields an empty index.
    pub fn scan(dir: &Path) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read headshot directory {:?}: {}", dir, e);
                return Self::default();
            }
        };

        let mut images = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_image(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                images.entry(image_key(stem)).or_insert(path);
            }
        }

        debug!("Indexed {} headshots from {:?}", images.len(), dir);
        Self {
            root: Some(dir.to_path_buf()),
            images,
        }
    }

    /// Image for `player_name`: exact key match, then the first image
    /// whose key extends the player's key with a `_` suffix (e.g.
    /// `connor_mcdavid_2023`). `mark_stoner` is not an image of Mark Stone.
    pub fn lookup(&self, player_name: &str) -> Option<&Path> {
        let key = image_key(player_name);
        if key.is_empty() {
            return None;
        }
        if let Some(path) = self.images.get(&key) {
            return Some(path.as_path());
        }
        let prefix = format!("{}_", key);
        self.images
            .range(prefix.clone()..)
            .next()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, p)| p.as_path())
    }

    /// The indexed directory, when there is one.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Path of the image relative to the indexed directory, for URLs.
    pub fn relative_path(&self, player_name: &str) -> Option<String> {
        let path = self.lookup(player_name)?;
        let root = self.root.as_deref()?;
        path.strip_prefix(root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Normalize a name or file stem: lowercase ASCII letters and digits,
/// everything else collapsed to single underscores.
fn image_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            key.push(c);
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"img").unwrap();
    }

    #[test]
    fn test_image_key() {
        assert_eq!(image_key("Pierre-Luc Dubois"), "pierre_luc_dubois");
        assert_eq!(image_key("pierre_luc_dubois"), "pierre_luc_dubois");
        assert_eq!(image_key("  J.T. Miller "), "j_t_miller");
    }

    #[test]
    fn test_exact_then_prefix_lookup() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Connor McDavid.png");
        touch(dir.path(), "leon_draisaitl_2023.jpg");
        touch(dir.path(), "notes.txt");

        let index = HeadshotIndex::scan(dir.path());
        assert_eq!(index.len(), 2);

        let exact = index.lookup("Connor McDavid").unwrap();
        assert!(exact.ends_with("Connor McDavid.png"));

        let prefix = index.lookup("Leon Draisaitl").unwrap();
        assert!(prefix.ends_with("leon_draisaitl_2023.jpg"));
        assert_eq!(
            index.relative_path("Leon Draisaitl").as_deref(),
            Some("leon_draisaitl_2023.jpg")
        );
    }

    #[test]
    fn test_absent_player_is_none() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "connor_mcdavid.png");
        let index = HeadshotIndex::scan(dir.path());

        assert!(index.lookup("Auston Matthews").is_none());
        assert!(index.lookup("").is_none());
        // A longer name is not a prefix match for a shorter stem
        assert!(index.lookup("Connor McDavid Jr").is_none());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let index = HeadshotIndex::scan(Path::new("/nonexistent/headshots"));
        assert!(index.is_empty());
        assert!(index.lookup("Anyone").is_none());
    }

    #[test]
    fn test_prefix_needs_separator() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "mark_stoner.png");
        touch(dir.path(), "mark_stone_2022.png");
        let index = HeadshotIndex::scan(dir.path());

        let path = index.lookup("Mark Stone").unwrap();
        assert!(path.ends_with("mark_stone_2022.png"));
        assert!(index.lookup("Mark Ston").is_none());
    }

    fn sample_archive() -> Vec<u8> {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.add_directory("headshots/", options).unwrap();
        writer.start_file("headshots/Connor McDavid.png", options).unwrap();
        writer.write_all(b"img").unwrap();
        writer.start_file("headshots/readme.txt", options).unwrap();
        writer.write_all(b"not an image").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_archive_flattens_images() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("headshots");
        assert_eq!(extract_archive(&sample_archive(), &dest).unwrap(), 1);

        let index = HeadshotIndex::scan(&dest);
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.relative_path("Connor McDavid").as_deref(),
            Some("Connor McDavid.png")
        );
        assert!(!dest.join("readme.txt").exists());
    }

    #[test]
    fn test_extract_rejects_non_zip_body() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(b"<html>not found</html>", dir.path()),
            Err(HeadshotError::InvalidSignature)
        ));
        assert!(matches!(
            extract_archive(b"PK\x03\x04truncated", dir.path()),
            Err(HeadshotError::Extract(_))
        ));
    }

    mod archive_url {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        use axum::extract::State;
        use axum::routing::get;
        use axum::Router;

        use super::*;
        use crate::fetch::test_server::serve;

        async fn archive(State(hits): State<Arc<AtomicUsize>>) -> Vec<u8> {
            hits.fetch_add(1, Ordering::SeqCst);
            sample_archive()
        }

        async fn site() -> (String, Arc<AtomicUsize>) {
            let hits = Arc::new(AtomicUsize::new(0));
            let router = Router::new()
                .route("/headshots.zip", get(archive))
                .route("/broken.zip", get(|| async { "<html>moved</html>" }))
                .with_state(hits.clone());
            (serve(router).await, hits)
        }

        fn config(data_dir: &Path, url: String) -> AppConfig {
            let mut config = AppConfig::default();
            config.data_dir = data_dir.to_path_buf();
            config.headshots.archive_url = Some(url);
            config
        }

        #[tokio::test]
        async fn test_archive_is_fetched_once() {
            let dir = TempDir::new().unwrap();
            let (base, hits) = site().await;
            let config = config(dir.path(), format!("{}/headshots.zip", base));

            let index = load(&config).await;
            assert_eq!(index.len(), 1);
            assert!(index.lookup("Connor McDavid").is_some());
            assert_eq!(index.root(), Some(config.headshots_dir().as_path()));

            let again = load(&config).await;
            assert_eq!(again.len(), 1);
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_bad_archive_falls_back_to_placeholders() {
            let dir = TempDir::new().unwrap();
            let (base, _) = site().await;
            let config = config(dir.path(), format!("{}/broken.zip", base));

            let index = load(&config).await;
            assert!(index.is_empty());
            assert!(index.lookup("Connor McDavid").is_none());
        }

        #[tokio::test]
        async fn test_configured_dir_wins_over_archive() {
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "leon_draisaitl.png");
            let mut config = config(dir.path(), "http://127.0.0.1:9/headshots.zip".to_string());
            config.headshots.dir = Some(dir.path().to_path_buf());

            let index = load(&config).await;
            assert_eq!(index.len(), 1);
            assert!(index.lookup("Leon Draisaitl").is_some());
        }
    }
}

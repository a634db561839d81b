//! The in-memory dataset and its process-wide cache.
//!
//! A [`Dataset`] is built fresh from the workbook on every load and never
//! mutated afterwards. [`DatasetStore`] holds the current one and decides
//! when to go back to the [`WorkbookSource`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::calculate;
use crate::config::SourceConfig;
use crate::fetch::FetchError;
use crate::models::{
    AgencySummary, AgentSummary, EntityId, PlayerContractRecord, RankEntry, Season, SummaryMetrics,
};
use crate::names::{name_key, NameNormalizer};
use crate::source::WorkbookSource;
use crate::workbook::{sheets, Workbook, WorkbookError};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to fetch workbook: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to read workbook: {0}")]
    Workbook(#[from] WorkbookError),
}

/// All tables from one workbook load.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub agents: Vec<AgentSummary>,
    pub ranks: Vec<RankEntry>,
    pub agencies: Vec<AgencySummary>,
    pub players: Vec<PlayerContractRecord>,
    pub seasons: Vec<Season>,
    pub loaded_at: DateTime<Utc>,

    /// Agencies were derived from player rows because the workbook has no
    /// agency sheet
    pub agencies_derived: bool,
}

impl Dataset {
    /// Parse a workbook's bytes.
    pub fn from_bytes(
        bytes: &[u8],
        config: &SourceConfig,
        names: &NameNormalizer,
    ) -> Result<Self, DatasetError> {
        let workbook = Workbook::from_bytes(bytes)?;
        Self::from_workbook(&workbook, config, names)
    }

    /// Build from parsed worksheets. The agent and player sheets are
    /// required; a missing rank sheet leaves ranks empty and a missing
    /// agency sheet is replaced by agencies derived from player rows.
    pub fn from_workbook(
        workbook: &Workbook,
        config: &SourceConfig,
        names: &NameNormalizer,
    ) -> Result<Self, DatasetError> {
        let agents = sheets::parse_agents(workbook.require_table(&config.agents_sheet)?, names)?;
        let players = sheets::parse_players(
            workbook.require_table(&config.players_sheet)?,
            names,
            &config.seasons,
        )?;

        let ranks = match workbook.table(&config.ranks_sheet) {
            Some(table) => sheets::parse_ranks(table, names)?,
            None => {
                warn!("No {} worksheet; agent ranks unavailable", config.ranks_sheet);
                Vec::new()
            }
        };

        let (agencies, agencies_derived) = match workbook.table(&config.agencies_sheet) {
            Some(table) => (sheets::parse_agencies(table, names)?, false),
            None => {
                warn!(
                    "No {} worksheet; deriving agencies from player rows",
                    config.agencies_sheet
                );
                (derive_agencies(&players), true)
            }
        };

        info!(
            "Loaded {} agents, {} ranks, {} agencies, {} player records",
            agents.len(),
            ranks.len(),
            agencies.len(),
            players.len()
        );

        Ok(Self {
            agents,
            ranks,
            agencies,
            players,
            seasons: config.seasons.clone(),
            loaded_at: Utc::now(),
            agencies_derived,
        })
    }

    /// Agent by ID or by name (case and spacing insensitive).
    pub fn find_agent(&self, id_or_name: &str) -> Option<&AgentSummary> {
        let by_id = EntityId::looks_like_id(id_or_name);
        let key = name_key(id_or_name);
        self.agents
            .iter()
            .find(|a| (by_id && a.id.as_str() == id_or_name) || name_key(&a.name) == key)
    }

    /// Agency by ID or by name.
    pub fn find_agency(&self, id_or_name: &str) -> Option<&AgencySummary> {
        let by_id = EntityId::looks_like_id(id_or_name);
        let key = name_key(id_or_name);
        self.agencies
            .iter()
            .find(|a| (by_id && a.id.as_str() == id_or_name) || name_key(&a.name) == key)
    }

    /// Agents whose name contains `query` (case-insensitive). An empty
    /// query matches everyone.
    pub fn search_agents(&self, query: &str) -> Vec<&AgentSummary> {
        let q = name_key(query);
        self.agents
            .iter()
            .filter(|a| q.is_empty() || name_key(&a.name).contains(&q))
            .collect()
    }

    pub fn search_agencies(&self, query: &str) -> Vec<&AgencySummary> {
        let q = name_key(query);
        self.agencies
            .iter()
            .filter(|a| q.is_empty() || name_key(&a.name).contains(&q))
            .collect()
    }

    pub fn records_for_agent(&self, agent_name: &str) -> Vec<&PlayerContractRecord> {
        let key = name_key(agent_name);
        self.players
            .iter()
            .filter(|p| name_key(&p.agent_name) == key)
            .collect()
    }

    pub fn records_for_agency(&self, agency_name: &str) -> Vec<&PlayerContractRecord> {
        let key = name_key(agency_name);
        self.players
            .iter()
            .filter(|p| name_key(&p.agency_name) == key)
            .collect()
    }

    pub fn rank_for_agent(&self, agent_name: &str) -> Option<&RankEntry> {
        let id = EntityId::agent(agent_name);
        self.ranks.iter().find(|r| r.agent_id == id)
    }

    /// Number of agents the published ranks are out of.
    pub fn rank_population(&self) -> usize {
        self.ranks.len()
    }

    /// Agents listed under `agency_name`, from the summary sheet or, when
    /// it has no agency column, from player rows.
    pub fn agents_in_agency(&self, agency_name: &str) -> Vec<&AgentSummary> {
        let key = name_key(agency_name);
        let from_players: Vec<String> = self
            .records_for_agency(agency_name)
            .iter()
            .map(|p| name_key(&p.agent_name))
            .collect();
        self.agents
            .iter()
            .filter(|a| match &a.agency_name {
                Some(agency) => name_key(agency) == key,
                None => from_players.contains(&name_key(&a.name)),
            })
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

/// Agency summaries computed from player rows, in first-appearance order.
pub fn derive_agencies(players: &[PlayerContractRecord]) -> Vec<AgencySummary> {
    let mut order: Vec<String> = Vec::new();
    for p in players {
        if !p.agency_name.is_empty() && !order.iter().any(|n| name_key(n) == name_key(&p.agency_name)) {
            order.push(p.agency_name.clone());
        }
    }

    order
        .into_iter()
        .map(|name| {
            let key = name_key(&name);
            let records: Vec<&PlayerContractRecord> =
                players.iter().filter(|p| name_key(&p.agency_name) == key).collect();
            let total_cost: f64 = records.iter().map(|r| r.total_cost).sum();
            let metrics = SummaryMetrics::new(
                &name,
                records.len() as u32,
                Some(total_cost),
                calculate::client_win_rate(&records),
                calculate::derive_capture_index(&records),
            );
            AgencySummary::new(name, metrics)
        })
        .collect()
}

struct CachedDataset {
    dataset: Arc<Dataset>,
    loaded: Instant,
}

/// Process-wide dataset cache with explicit invalidation.
pub struct DatasetStore {
    source: Arc<dyn WorkbookSource>,
    config: SourceConfig,
    names: NameNormalizer,
    ttl: Option<Duration>,
    cached: RwLock<Option<CachedDataset>>,
}

impl DatasetStore {
    pub fn new(source: Arc<dyn WorkbookSource>, config: SourceConfig, names: NameNormalizer) -> Self {
        let ttl = config.cache_ttl();
        Self {
            source,
            config,
            names,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// The current dataset, loading it on first use, after the TTL lapses,
    /// or on every call when `force_reload` is configured. When a refetch
    /// fails the previous dataset is served; only a failed first load is
    /// an error.
    pub async fn get(&self) -> Result<Arc<Dataset>, DatasetError> {
        if !self.config.force_reload {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref().filter(|c| self.is_fresh(c)) {
                return Ok(cached.dataset.clone());
            }
        }
        match self.load(self.config.force_reload).await {
            Ok(dataset) => Ok(dataset),
            Err(e) => match self.cached().await {
                Some(stale) => {
                    warn!(
                        "Refresh failed, serving dataset loaded at {}: {}",
                        stale.loaded_at, e
                    );
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Drop the cache and refetch. On failure the previous dataset stays
    /// in place.
    pub async fn reload(&self) -> Result<Arc<Dataset>, DatasetError> {
        self.load(true).await
    }

    /// The cached dataset, without loading.
    pub async fn cached(&self) -> Option<Arc<Dataset>> {
        self.cached.read().await.as_ref().map(|c| c.dataset.clone())
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    fn is_fresh(&self, cached: &CachedDataset) -> bool {
        self.ttl.map_or(true, |ttl| cached.loaded.elapsed() < ttl)
    }

    async fn load(&self, force: bool) -> Result<Arc<Dataset>, DatasetError> {
        let mut guard = self.cached.write().await;
        if !force {
            // Another caller may have loaded while we waited for the lock
            if let Some(cached) = guard.as_ref().filter(|c| self.is_fresh(c)) {
                return Ok(cached.dataset.clone());
            }
        }

        info!("Loading workbook from {}", self.source.describe());
        let bytes = self.source.load(force).await.inspect_err(|e| {
            warn!("Workbook fetch failed: {}", e);
        })?;
        let dataset = Arc::new(Dataset::from_bytes(&bytes, &self.config, &self.names)?);

        *guard = Some(CachedDataset {
            dataset: dataset.clone(),
            loaded: Instant::now(),
        });
        Ok(dataset)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::test_support::sample_workbook;
    use super::*;
    use crate::models::default_seasons;
    use crate::source::MemoryWorkbookSource;

    fn config() -> SourceConfig {
        SourceConfig::default()
    }

    #[test]
    fn test_from_bytes_full_workbook() {
        let ds = Dataset::from_bytes(&sample_workbook(true), &config(), &NameNormalizer::default()).unwrap();
        assert_eq!(ds.agents.len(), 3);
        assert_eq!(ds.players.len(), 4);
        assert_eq!(ds.ranks.len(), 3);
        assert_eq!(ds.agencies.len(), 2);
        assert!(!ds.agencies_derived);
        assert_eq!(ds.seasons, default_seasons());

        // Names are normalized at load time
        assert!(ds.players.iter().any(|p| p.player_name == "Zach Aston-Reese"));
    }

    #[test]
    fn test_from_bytes_without_optional_sheets() {
        let ds = Dataset::from_bytes(&sample_workbook(false), &config(), &NameNormalizer::default()).unwrap();
        assert!(ds.ranks.is_empty());
        assert!(ds.agencies_derived);
        assert_eq!(ds.agencies.len(), 2);

        let caa = ds.find_agency("caa hockey").unwrap();
        assert_eq!(caa.metrics.contracts_tracked, 3);
        // (2M + 1M + 1M) / (2M + 0.9M + 1M)
        let expected = 4_000_000.0 / 3_900_000.0;
        assert!((caa.metrics.capture_index.unwrap() - expected).abs() < 1e-9);

        // Octagon's only client has zero value: no capture index
        let octagon = ds.find_agency("Octagon").unwrap();
        assert_eq!(octagon.metrics.capture_index, None);
    }

    #[test]
    fn test_missing_required_sheet() {
        let mut cfg = config();
        cfg.players_sheet = "Players".to_string();
        let err = Dataset::from_bytes(&sample_workbook(true), &cfg, &NameNormalizer::default()).unwrap_err();
        assert!(matches!(err, DatasetError::Workbook(WorkbookError::MissingSheet(_))));
    }

    #[test]
    fn test_lookups() {
        let ds = Dataset::from_bytes(&sample_workbook(true), &config(), &NameNormalizer::default()).unwrap();

        let pat = ds.find_agent("pat  brisson").unwrap();
        assert_eq!(ds.find_agent(pat.id.as_str()).unwrap().name, "Pat Brisson");
        assert!(ds.find_agent("Nobody").is_none());

        assert_eq!(ds.records_for_agent("Pat Brisson").len(), 3);
        assert_eq!(ds.records_for_agency("Octagon").len(), 1);
        assert_eq!(ds.rank_for_agent("Pat Brisson").unwrap().capture_index, Some(2));
        assert_eq!(ds.rank_population(), 3);
        assert_eq!(ds.search_agents("jack").len(), 1);
        assert_eq!(ds.search_agents("").len(), 3);

        let caa_agents: Vec<_> = ds.agents_in_agency("CAA Hockey").iter().map(|a| a.name.clone()).collect();
        assert_eq!(caa_agents, vec!["Pat Brisson"]);
    }

    #[test]
    fn test_agent_capture_from_players() {
        let ds = Dataset::from_bytes(&sample_workbook(true), &config(), &NameNormalizer::default()).unwrap();
        let records = ds.records_for_agent("Pat Brisson");
        let s18 = Season::new(2018);
        // 2.5M cost over 2.6M value
        let pct = calculate::capture_pct(&records, s18).unwrap();
        assert!((pct - 2_500_000.0 / 2_600_000.0 * 100.0).abs() < 1e-9);

        // Jeff Jackson's 2018 value is zero and 2019 value missing
        let records = ds.records_for_agent("Jeff Jackson");
        assert_eq!(calculate::capture_pct(&records, s18), None);
        assert_eq!(calculate::capture_pct(&records, Season::new(2019)), None);
    }

    struct CountingSource {
        bytes: Vec<u8>,
        loads: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl WorkbookSource for CountingSource {
        async fn load(&self, _force: bool) -> Result<Vec<u8>, FetchError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::HttpStatus {
                    status: 404,
                    message: "Not Found".to_string(),
                });
            }
            Ok(self.bytes.clone())
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    fn counting(fail: bool) -> Arc<CountingSource> {
        Arc::new(CountingSource {
            bytes: sample_workbook(true),
            loads: AtomicUsize::new(0),
            fail: AtomicBool::new(fail),
        })
    }

    #[tokio::test]
    async fn test_store_caches_until_reload() {
        let source = counting(false);
        let store = DatasetStore::new(source.clone(), config(), NameNormalizer::default());
        assert!(store.cached().await.is_none());

        let a = store.get().await.unwrap();
        let b = store.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        let c = store.reload().await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_force_reload_every_get() {
        let source = counting(false);
        let mut cfg = config();
        cfg.force_reload = true;
        let store = DatasetStore::new(source.clone(), cfg, NameNormalizer::default());

        store.get().await.unwrap();
        store.get().await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_fetch_failure_is_reported() {
        let store = DatasetStore::new(counting(true), config(), NameNormalizer::default());
        let err = store.get().await.unwrap_err();
        assert!(matches!(err, DatasetError::Fetch(FetchError::HttpStatus { status: 404, .. })));
        assert!(store.cached().await.is_none());
    }

    #[tokio::test]
    async fn test_store_serves_previous_dataset_when_refetch_fails() {
        let source = counting(false);
        let mut cfg = config();
        cfg.force_reload = true;
        let store = DatasetStore::new(source.clone(), cfg, NameNormalizer::default());
        let first = store.get().await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        let again = store.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);

        // An explicit reload still reports the failure
        assert!(matches!(store.reload().await, Err(DatasetError::Fetch(_))));
        assert!(Arc::ptr_eq(&store.cached().await.unwrap(), &first));
    }

    #[tokio::test]
    async fn test_store_serves_previous_dataset_after_ttl() {
        let source = counting(false);
        let mut cfg = config();
        cfg.cache_ttl = Some("0s".to_string());
        let store = DatasetStore::new(source.clone(), cfg, NameNormalizer::default());
        let first = store.get().await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        let again = store.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_bad_archive_is_workbook_error() {
        let source = Arc::new(MemoryWorkbookSource::new(b"PK-but-not-really".to_vec()));
        let store = DatasetStore::new(source, config(), NameNormalizer::default());
        assert!(matches!(store.get().await, Err(DatasetError::Workbook(_))));
    }
}

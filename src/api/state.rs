use std::sync::Arc;

use crate::api::ApiError;
use crate::config::AppConfig;
use crate::dataset::{Dataset, DatasetStore};
use crate::headshots::HeadshotIndex;
use crate::leaderboard::ExclusionList;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<DatasetStore>,
    pub exclusions: Arc<ExclusionList>,
    pub headshots: Arc<HeadshotIndex>,
}

impl AppState {
    pub fn new(config: AppConfig, store: DatasetStore, headshots: HeadshotIndex) -> Self {
        let exclusions = ExclusionList::new(&config.leaderboard.excluded_agents);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            exclusions: Arc::new(exclusions),
            headshots: Arc::new(headshots),
        }
    }

    /// The current dataset, or 503 when it cannot be loaded.
    pub async fn dataset(&self) -> Result<Arc<Dataset>, ApiError> {
        Ok(self.store.get().await?)
    }

    /// URL path of a player's headshot, if one is indexed.
    pub fn headshot_url(&self, player_name: &str) -> Option<String> {
        let relative = self.headshots.relative_path(player_name)?;
        let base = url::Url::parse("http://localhost/headshots/").ok()?;
        base.join(&relative).ok().map(|u| u.path().to_string())
    }
}

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::api::state::AppState;
use crate::api::ApiError;

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub status: &'static str,
    pub source: String,
    pub loaded_at: DateTime<Utc>,
    pub agents: usize,
    pub agencies: usize,
    pub players: usize,
}

/// Drop the cached dataset and reload the workbook. A failed reload keeps
/// serving the previous dataset.
pub async fn refresh(State(state): State<AppState>) -> Result<Json<RefreshResponse>, ApiError> {
    match state.store.reload().await {
        Ok(dataset) => {
            info!("Dataset reloaded: {} players", dataset.player_count());
            Ok(Json(RefreshResponse {
                status: "reloaded",
                source: state.store.source_description(),
                loaded_at: dataset.loaded_at,
                agents: dataset.agents.len(),
                agencies: dataset.agencies.len(),
                players: dataset.player_count(),
            }))
        }
        Err(e) => {
            let kept = state.store.cached().await.is_some();
            warn!("Reload failed (previous dataset kept: {}): {}", kept, e);
            let message = if kept {
                format!("{}; still serving the previous dataset", e)
            } else {
                e.to_string()
            };
            Err(ApiError::Unavailable(message))
        }
    }
}

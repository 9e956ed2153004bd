use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report `ok` while the session coordinator is consuming events, `degraded` otherwise.
pub fn health_status(state: &SharedState) -> HealthResponse {
    if state.coordinator().is_running() {
        HealthResponse::ok()
    } else {
        warn!("session coordinator stopped (degraded mode)");
        HealthResponse::degraded()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::catalog::StaticSongCatalog,
        state::{AppState, testing::songs},
    };

    #[tokio::test]
    async fn running_coordinator_is_healthy() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(StaticSongCatalog::new(songs(1), false)),
        );
        assert_eq!(health_status(&state).status, "ok");
    }
}

pub mod coordinator;
pub mod room;
pub mod timer;

use std::sync::Arc;

use crate::{config::AppConfig, dao::catalog::SongCatalog};

pub use self::coordinator::{CoordinatorEvent, CoordinatorHandle};

pub type SharedState = Arc<AppState>;

/// Central application state: immutable configuration plus the coordinator mailbox.
///
/// Room and membership state is not reachable from here; it lives inside the coordinator
/// task and is only touched through [`CoordinatorHandle`].
pub struct AppState {
    config: Arc<AppConfig>,
    coordinator: CoordinatorHandle,
}

impl AppState {
    /// Spawn the session coordinator and wrap everything in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, catalog: Arc<dyn SongCatalog>) -> SharedState {
        let coordinator = CoordinatorHandle::spawn(catalog, config.notify_rejections);
        Arc::new(Self {
            config: Arc::new(config),
            coordinator,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Mailbox of the session coordinator.
    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }
}

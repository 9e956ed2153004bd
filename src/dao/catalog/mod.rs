//! Song catalog providers feeding new rooms with playable songs.

pub mod error;
mod fixed;
mod http;
pub mod models;

use std::sync::Arc;

use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use tracing::info;

use crate::{config::CatalogConfig, state::room::Song};

pub use self::error::{CatalogError, CatalogResult};
pub use self::fixed::StaticSongCatalog;
pub use self::http::HttpSongCatalog;

/// Parameters of a song lookup for a room being created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    /// Number of songs required, one per round.
    pub count: usize,
    /// Optional artist/search term chosen by the room creator.
    pub artist: Option<String>,
}

/// Abstraction over the source of playable songs.
pub trait SongCatalog: Send + Sync {
    /// Return exactly `request.count` songs in play order, or fail.
    fn fetch(&self, request: CatalogRequest) -> BoxFuture<'static, CatalogResult<Vec<Song>>>;
}

/// Build the provider selected by the configuration: the static list when one is
/// configured, the HTTP search endpoint otherwise.
pub fn from_config(config: &CatalogConfig) -> CatalogResult<Arc<dyn SongCatalog>> {
    if config.songs.is_empty() {
        info!(endpoint = %config.endpoint, "using HTTP song catalog");
        Ok(Arc::new(HttpSongCatalog::new(config)?))
    } else {
        info!(count = config.songs.len(), "using static song catalog");
        Ok(Arc::new(StaticSongCatalog::new(
            config.songs.clone(),
            config.shuffle,
        )))
    }
}

/// Optionally shuffle the candidates, then keep the first `count`.
fn select_songs(mut songs: Vec<Song>, count: usize, shuffle: bool) -> CatalogResult<Vec<Song>> {
    if songs.len() < count {
        return Err(CatalogError::InsufficientSongs {
            requested: count,
            available: songs.len(),
        });
    }
    if shuffle {
        songs.shuffle(&mut rand::rng());
    }
    songs.truncate(count);
    Ok(songs)
}

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::state::room::Song;

use super::{CatalogRequest, CatalogResult, SongCatalog, select_songs};

/// Catalog serving a fixed song list, configured offline or used by tests.
#[derive(Debug, Clone)]
pub struct StaticSongCatalog {
    songs: Arc<[Song]>,
    shuffle: bool,
}

impl StaticSongCatalog {
    /// Serve `songs`, optionally reshuffled for every room.
    pub fn new(songs: Vec<Song>, shuffle: bool) -> Self {
        Self {
            songs: songs.into(),
            shuffle,
        }
    }
}

impl SongCatalog for StaticSongCatalog {
    fn fetch(&self, request: CatalogRequest) -> BoxFuture<'static, CatalogResult<Vec<Song>>> {
        let result = select_songs(self.songs.to_vec(), request.count, self.shuffle);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::catalog::CatalogError, state::testing::songs};

    #[tokio::test]
    async fn serves_requested_count() {
        let catalog = StaticSongCatalog::new(songs(3), false);
        let fetched = catalog
            .fetch(CatalogRequest {
                count: 2,
                artist: Some("ignored".into()),
            })
            .await
            .unwrap();
        assert_eq!(fetched, songs(2));
    }

    #[tokio::test]
    async fn reports_missing_songs() {
        let catalog = StaticSongCatalog::new(songs(1), false);
        let err = catalog
            .fetch(CatalogRequest {
                count: 2,
                artist: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InsufficientSongs { .. }));
    }
}

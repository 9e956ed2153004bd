use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::{debug, info};

use crate::{config::CatalogConfig, state::room::Song};

use super::{
    CatalogRequest, CatalogResult, SongCatalog,
    error::CatalogError,
    models::{CatalogResponse, CatalogTrack},
    select_songs,
};

/// Extra candidates requested since tracks without a preview clip are skipped.
const POOL_FACTOR: usize = 2;
/// Wider pool requested when shuffling so rooms do not always get the top hits.
const SHUFFLE_POOL_FACTOR: usize = 4;
/// Upper bound accepted by the search endpoint for `limit`.
const MAX_SEARCH_LIMIT: usize = 200;

/// Catalog backed by an HTTP song search endpoint (iTunes search API compatible).
#[derive(Clone)]
pub struct HttpSongCatalog {
    client: Client,
    endpoint: Arc<str>,
    default_term: Arc<str>,
    shuffle: bool,
}

impl HttpSongCatalog {
    /// Build the HTTP client using the configured endpoint and timeout.
    pub fn new(config: &CatalogConfig) -> CatalogResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| CatalogError::ClientBuilder { source })?;

        Ok(Self {
            client,
            endpoint: Arc::from(config.endpoint.as_str()),
            default_term: Arc::from(config.default_term.as_str()),
            shuffle: config.shuffle,
        })
    }

    async fn search(&self, request: CatalogRequest) -> CatalogResult<Vec<Song>> {
        let term = search_term(request.artist.as_deref(), &self.default_term);
        let limit = search_limit(request.count, self.shuffle);
        let endpoint = self.endpoint.to_string();
        let limit_param = limit.to_string();

        info!(%term, limit, "querying song catalog");
        let response = self
            .client
            .get(endpoint.as_str())
            .query(&[("term", term.as_str()), ("limit", limit_param.as_str())])
            .send()
            .await
            .map_err(|source| CatalogError::RequestSend {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::RequestStatus { endpoint, status });
        }

        let body = response
            .json::<CatalogResponse>()
            .await
            .map_err(|source| CatalogError::DecodeResponse {
                endpoint: endpoint.clone(),
                source,
            })?;

        let songs = playable_songs(body.results);
        debug!(count = songs.len(), "song catalog returned playable songs");
        select_songs(songs, request.count, self.shuffle)
    }
}

impl SongCatalog for HttpSongCatalog {
    fn fetch(&self, request: CatalogRequest) -> BoxFuture<'static, CatalogResult<Vec<Song>>> {
        let catalog = self.clone();
        Box::pin(async move { catalog.search(request).await })
    }
}

fn search_term(artist: Option<&str>, default_term: &str) -> String {
    artist
        .map(str::trim)
        .filter(|artist| !artist.is_empty())
        .unwrap_or(default_term)
        .to_string()
}

fn search_limit(count: usize, shuffle: bool) -> usize {
    let factor = if shuffle { SHUFFLE_POOL_FACTOR } else { POOL_FACTOR };
    count
        .saturating_mul(factor)
        .min(MAX_SEARCH_LIMIT)
        .max(count)
}

fn playable_songs(tracks: Vec<CatalogTrack>) -> Vec<Song> {
    tracks
        .into_iter()
        .filter_map(|track| Song::try_from(track).ok())
        .collect()
}

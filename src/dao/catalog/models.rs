//! Wire models returned by the song search endpoint.

use serde::Deserialize;

/// Envelope of a search response.
#[derive(Debug, Deserialize)]
pub struct CatalogResponse {
    /// Matching tracks, in relevance order.
    #[serde(default)]
    pub results: Vec<CatalogTrack>,
}

/// Single track entry. Every field is optional on the wire; unplayable entries are skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTrack {
    /// Track title.
    #[serde(default)]
    pub track_name: Option<String>,
    /// Audio preview clip.
    #[serde(default)]
    pub preview_url: Option<String>,
    /// 100x100 cover artwork.
    #[serde(default, rename = "artworkUrl100")]
    pub artwork_url: Option<String>,
}

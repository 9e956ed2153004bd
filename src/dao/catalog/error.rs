//! Error types shared by the song catalog providers.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`CatalogError`] failures.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Failures that can occur while fetching songs for a new room.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build catalog client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The search request could not be sent or timed out.
    #[error("failed to query song catalog `{endpoint}`")]
    RequestSend {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// The catalog answered with a non-success status.
    #[error("unexpected song catalog response status {status} for `{endpoint}`")]
    RequestStatus { endpoint: String, status: StatusCode },
    /// Response payload could not be decoded.
    #[error("failed to decode song catalog response from `{endpoint}`")]
    DecodeResponse {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// Fewer playable songs than rounds requested.
    #[error("song catalog returned {available} playable songs, {requested} requested")]
    InsufficientSongs { requested: usize, available: usize },
}

//! Error types shared across the engine.
//!
//! Only [`SetupError`] is fatal. [`SourceError`] is what a scheduled reload
//! produces when the list cannot be refreshed; the caller logs it and keeps
//! serving the previous index.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid input handed to [`DomainIndex::build`](crate::engine::DomainIndex::build).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("domain index entries must not be empty")]
    EmptyName,

    #[error("could not place {keys} keys after {attempts} seeds")]
    Exhausted { keys: usize, attempts: u32 },
}

/// A failure to fetch or rebuild the domain list.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to build domain index: {0}")]
    Index(#[from] IndexError),

    #[error("index build worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Configuration or startup failure. Prevents the component from starting.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("a domain list `file` or `url` is required")]
    MissingSource,

    #[error("`file` and `url` are mutually exclusive, use one or the other")]
    ConflictingSource,

    #[error("unknown file format: {0}")]
    UnknownFormat(String),

    #[error("unknown policy mode: {0}")]
    UnknownMode(String),

    #[error("unknown block response: {0}")]
    UnknownBlockResponse(String),

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("invalid upstream address {0:?}")]
    InvalidUpstream(String),

    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("initial domain list build failed: {0}")]
    InitialBuild(#[source] SourceError),
}

#![forbid(unsafe_code)]

use std::path::PathBuf;
use thiserror::Error;

/// A setting required by the selected stages is missing or malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("reading config file {path}: {message}")]
    File { path: PathBuf, message: String },
}

/// Failure of an HTTP call against the YouTube Data API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, refused, TLS, reset...).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("response from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },
}

/// Failure while following a link's redirect chain.
#[derive(Debug, Error)]
pub enum FollowError {
    #[error("connection to {link} failed: {message}")]
    Connection { link: String, message: String },
}

/// Failure of the spreadsheet write or of the credential exchange before it.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("sheets request failed: {0}")]
    Transport(String),

    #[error("sheets rejected the update with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token exchange failed: {0}")]
    Token(String),

    #[error("invalid sheets endpoint {0}")]
    Endpoint(String),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot {path} does not exist; run the earlier stage first")]
    NotFound { path: PathBuf },

    #[error("i/o on snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        ApiError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(url: &str, err: impl std::fmt::Display) -> Self {
        ApiError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

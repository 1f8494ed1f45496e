//! Error types. Request failures all surface to the user as
//! [`FETCH_ERROR_MESSAGE`](crate::types::FETCH_ERROR_MESSAGE); the variants
//! exist so the log can say what actually went wrong.

use std::path::PathBuf;

use crate::types::FETCH_ERROR_MESSAGE;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request never completed (connect, DNS, reset, body read).
    #[error("network failure: {0}")]
    Network(String),

    #[error("search endpoint returned HTTP {0}")]
    HttpStatus(u16),

    /// Top-level body was not JSON or not the expected shape.
    #[error("could not decode response body: {0}")]
    BodyDecode(String),
}

impl FetchError {
    /// What the rendering layer shows. Never includes the underlying detail.
    pub fn user_message(&self) -> &'static str {
        FETCH_ERROR_MESSAGE
    }
}

/// Why a single result item fell back to its raw text. Recovered, never surfaced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ItemDecodeError {
    #[error("item has no string `text` field")]
    MissingText,

    #[error("`text` is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("`text` decodes to JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

//! Error taxonomy for a poll cycle.
//!
//! `FetchError` and `ParseError` abort the current cycle only. `ItemDefect`
//! and `IconFetchError` are recovered where they happen and never abort a
//! cycle.

use crate::feed::types::RateMetadata;
use thiserror::Error;

/// Failure of the single feed GET issued by a cycle.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS or timeout failure. The server never answered.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status. The rate-limit headers of
    /// that response are kept so the budget can still be refreshed.
    #[error("feed returned HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        message: String,
        rate: RateMetadata,
    },

    /// The server answered 2xx but the body could not be read to the end.
    /// The headers already arrived, so their rate metadata is kept.
    #[error("failed to read feed body: {message}")]
    Body { message: String, rate: RateMetadata },
}

impl FetchError {
    /// Rate metadata carried by the failure, if the server responded at all.
    pub fn rate(&self) -> Option<&RateMetadata> {
        match self {
            FetchError::Transport(_) => None,
            FetchError::HttpStatus { rate, .. } | FetchError::Body { rate, .. } => Some(rate),
        }
    }
}

/// The response body could not be decoded at the top level.
#[derive(Debug, Clone, Error)]
#[error("malformed feed body: {0}")]
pub struct ParseError(pub String);

/// Why a cycle was aborted.
#[derive(Debug, Clone, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A single feed entry that could not be turned into an item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemDefect {
    #[error("entry {index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("entry {index} has no id, html_url or url")]
    MissingIdentifier { index: usize },
}

/// Secondary icon download failed. The item simply stays without an icon.
#[derive(Debug, Clone, Error)]
pub enum IconFetchError {
    #[error("icon transport error: {0}")]
    Transport(String),
    #[error("icon host returned HTTP {0}")]
    HttpStatus(u16),
    #[error("icon exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

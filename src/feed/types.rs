use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

// Normalized internal types handed to the scheduler and presentation layer.

/// Remaining-budget value assumed when the server omits the header, so that a
/// missing header never halts polling.
pub const DEFAULT_RATE_REMAINING: u64 = 5000;

/// Icon used when the owner has no usable avatar.
pub const PLACEHOLDER_ICON_URL: &str =
    "https://github.githubassets.com/images/gravatars/gravatar-user-420.png";

/// Owner name used when the entry carries no owner object.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// File name used when the entry lists no files.
pub const UNTITLED_FILE: &str = "untitled";

/// One feed entry as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Stable key used for de-duplication and icon correlation.
    pub identifier: String,
    /// Owner login, or [`ANONYMOUS_OWNER`].
    pub owner: String,
    /// `"<owner> / <first file name>"`.
    pub title: String,
    /// Empty when the entry has no description.
    pub description: String,
    pub content_url: String,
    pub icon_url: String,
    /// `None` when the source omitted or malformed the timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Rate-limit info extracted from response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateMetadata {
    pub remaining: u64,
    pub limit: Option<u64>,
    /// When the server says the budget refills.
    pub reset_at: Option<DateTime<Utc>>,
}

impl Default for RateMetadata {
    fn default() -> Self {
        Self {
            remaining: DEFAULT_RATE_REMAINING,
            limit: None,
            reset_at: None,
        }
    }
}

/// A successful feed response: the raw body plus its rate metadata.
#[derive(Debug, Clone)]
pub struct FeedResponse {
    pub body: String,
    pub rate: RateMetadata,
}

/// GitHub gists API entry. Every field is kept as a raw JSON value because the
/// shapes vary between entries (`owner` may be null, `files` may be a map or a
/// list of maps).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawGist {
    pub id: Value,
    pub url: Value,
    pub html_url: Value,
    pub description: Value,
    pub owner: Value,
    pub updated_at: Value,
    pub files: Value,
}

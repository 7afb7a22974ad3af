pub mod gists;
pub mod parser;
pub mod types;

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use types::FeedResponse;

/// One GET against the feed endpoint per call, no internal retry.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, since: DateTime<Utc>) -> Result<FeedResponse, FetchError>;
}

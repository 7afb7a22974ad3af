//! Avatar downloads, correlated back to items by identifier.
//!
//! Each request runs as its own task and reports an [`IconDelivery`] on a
//! channel. Deliveries carry only the item identifier, never a handle into
//! the presentation layer, so a result that arrives after its item has been
//! replaced is resolved (or dropped) by lookup at delivery time.

use crate::config::IconConfig;
use crate::error::IconFetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// Downloads raw image bytes for a URL.
#[async_trait]
pub trait IconSource: Send + Sync {
    async fn fetch_icon(&self, url: &str) -> Result<Vec<u8>, IconFetchError>;
}

/// Shared, pooled HTTP client for every icon request.
pub struct HttpIconSource {
    client: Client,
    max_bytes: usize,
}

impl HttpIconSource {
    pub fn new(config: &IconConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(config.max_concurrent)
            .user_agent(user_agent)
            .build()
            .context("failed to build icon HTTP client")?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait]
impl IconSource for HttpIconSource {
    async fn fetch_icon(&self, url: &str) -> Result<Vec<u8>, IconFetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IconFetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IconFetchError::HttpStatus(status.as_u16()));
        }
        if resp
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(IconFetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        // Stream so an oversized body without Content-Length is cut off early
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IconFetchError::Transport(e.to_string()))?;
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(IconFetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Outcome of one icon request, tagged with the requesting item.
#[derive(Debug)]
pub struct IconDelivery {
    pub identifier: String,
    pub result: Result<Vec<u8>, IconFetchError>,
}

/// Fires icon requests immediately, at most `max_concurrent` in flight.
#[derive(Clone)]
pub struct IconFetcher {
    source: Arc<dyn IconSource>,
    permits: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<IconDelivery>,
}

impl IconFetcher {
    /// Returns the fetcher and the receiver its deliveries arrive on.
    pub fn new(
        source: Arc<dyn IconSource>,
        max_concurrent: usize,
    ) -> (Self, mpsc::UnboundedReceiver<IconDelivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fetcher = Self {
            source,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tx,
        };
        (fetcher, rx)
    }

    /// Spawn a download for `identifier`. Never blocks; completion order is
    /// unspecified.
    pub fn request_icon(&self, identifier: String, url: String) {
        let source = Arc::clone(&self.source);
        let permits = Arc::clone(&self.permits);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let result = source.fetch_icon(&url).await;
            if let Err(e) = &result {
                tracing::debug!(identifier = %identifier, url = %url, error = %e, "icon fetch failed");
            }
            // Receiver gone means the scheduler has shut down
            let _ = tx.send(IconDelivery { identifier, result });
        });
    }
}

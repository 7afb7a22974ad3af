// Fakes shared by the integration tests. Nothing here touches the network.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gist_watch::config::PollConfig;
use gist_watch::cursor::CursorStore;
use gist_watch::error::{FetchError, IconFetchError};
use gist_watch::feed::types::{FeedResponse, Item, RateMetadata};
use gist_watch::feed::FeedSource;
use gist_watch::icon::{IconDelivery, IconFetcher, IconSource};
use gist_watch::presentation::{MenuModel, PresentationSink};
use gist_watch::scheduler::Scheduler;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn rate(remaining: u64) -> RateMetadata {
    RateMetadata {
        remaining,
        limit: Some(60),
        reset_at: None,
    }
}

pub fn ok_response(body: &str, remaining: u64) -> Result<FeedResponse, FetchError> {
    Ok(FeedResponse {
        body: body.to_string(),
        rate: rate(remaining),
    })
}

pub fn http_error(status: u16, remaining: u64) -> Result<FeedResponse, FetchError> {
    Err(FetchError::HttpStatus {
        status,
        message: "error".to_string(),
        rate: rate(remaining),
    })
}

/// One gist entry as the API would return it.
pub fn gist_json(id: &str, login: &str, updated_at: &str) -> String {
    format!(
        r#"{{"id":"{id}","html_url":"https://gist.test/{id}","description":"about {id}","owner":{{"login":"{login}","avatar_url":"https://avatars.test/{login}.png"}},"updated_at":"{updated_at}","files":{{"{id}.txt":{{}}}}}}"#
    )
}

pub fn feed_body(entries: &[String]) -> String {
    format!("[{}]", entries.join(","))
}

/// Replays canned responses in order; an exhausted script answers `[]`.
#[derive(Default)]
pub struct ScriptedFeed {
    responses: Mutex<VecDeque<Result<FeedResponse, FetchError>>>,
    calls: Mutex<Vec<DateTime<Utc>>>,
    responded_at: Mutex<Vec<DateTime<Utc>>>,
    delay: Option<Duration>,
}

impl ScriptedFeed {
    pub fn new(responses: Vec<Result<FeedResponse, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `since` of every fetch issued so far.
    pub fn calls(&self) -> Vec<DateTime<Utc>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn responded_at(&self) -> Vec<DateTime<Utc>> {
        self.responded_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch(&self, since: DateTime<Utc>) -> Result<FeedResponse, FetchError> {
        self.calls.lock().unwrap().push(since);
        let next = self.responses.lock().unwrap().pop_front();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responded_at.lock().unwrap().push(Utc::now());
        next.unwrap_or_else(|| ok_response("[]", 59))
    }
}

/// Icon bytes are the URL itself; URLs containing "broken" fail.
pub struct EchoIcons;

#[async_trait]
impl IconSource for EchoIcons {
    async fn fetch_icon(&self, url: &str) -> Result<Vec<u8>, IconFetchError> {
        if url.contains("broken") {
            return Err(IconFetchError::HttpStatus(500));
        }
        Ok(url.as_bytes().to_vec())
    }
}

/// Cursor store whose contents stay visible to the test after the
/// scheduler takes ownership.
#[derive(Clone, Default)]
pub struct SharedStore {
    pub saved: Arc<Mutex<Option<DateTime<Utc>>>>,
    pub fail_saves: bool,
}

impl CursorStore for SharedStore {
    fn load(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(*self.saved.lock().unwrap())
    }

    fn save(&mut self, cursor: DateTime<Utc>) -> anyhow::Result<()> {
        if self.fail_saves {
            anyhow::bail!("disk full");
        }
        *self.saved.lock().unwrap() = Some(cursor);
        Ok(())
    }
}

#[derive(Default)]
pub struct Recorded {
    pub announced: Vec<String>,
    pub menu: MenuModel,
    pub populate_calls: usize,
    pub attach_calls: Vec<(String, bool)>,
}

/// Sink that records every call behind a shared handle.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub inner: Arc<Mutex<Recorded>>,
}

impl PresentationSink for RecordingSink {
    fn announce(&mut self, item: &Item) {
        self.inner
            .lock()
            .unwrap()
            .announced
            .push(item.identifier.clone());
    }

    fn populate_menu(&mut self, items: Vec<Item>) {
        let mut rec = self.inner.lock().unwrap();
        rec.populate_calls += 1;
        rec.menu.replace(items);
    }

    fn attach_icon(&mut self, identifier: &str, image: Vec<u8>) -> bool {
        let mut rec = self.inner.lock().unwrap();
        let attached = rec.menu.attach(identifier, image);
        rec.attach_calls.push((identifier.to_string(), attached));
        attached
    }
}

pub fn poll_config() -> PollConfig {
    PollConfig {
        interval_s: 3600,
        initial_lookback_s: 600,
        resume_on_reset: true,
        seen_capacity: 100,
    }
}

pub struct Harness {
    pub scheduler: Scheduler<RecordingSink>,
    pub feed: Arc<ScriptedFeed>,
    pub store: SharedStore,
    pub sink: RecordingSink,
    pub icon_rx: mpsc::UnboundedReceiver<IconDelivery>,
}

pub fn harness(feed: ScriptedFeed, config: PollConfig) -> Harness {
    harness_with_store(feed, config, SharedStore::default())
}

pub fn harness_with_store(feed: ScriptedFeed, config: PollConfig, store: SharedStore) -> Harness {
    let feed = Arc::new(feed);
    let (icons, icon_rx) = IconFetcher::new(Arc::new(EchoIcons), 4);
    let sink = RecordingSink::default();
    let scheduler = Scheduler::new(
        feed.clone(),
        icons,
        Box::new(store.clone()),
        sink.clone(),
        &config,
    );
    Harness {
        scheduler,
        feed,
        store,
        sink,
        icon_rx,
    }
}

//! Poll scheduler: owns the cursor, the rate budget and the timer, and drives
//! fetch -> parse -> present -> icon fan-out once per cycle.
//!
//! ```text
//!   Idle ──tick──► Fetching ──ok/err──► Idle         (next tick = start + interval)
//!                           └─budget 0─► Suspended   (next tick = reset time, or never)
//! ```
//!
//! All state lives on the scheduler and is only mutated in [`Scheduler::begin_cycle`]
//! and [`Scheduler::finish_cycle`], so a cycle can be replayed in tests with
//! explicit instants and canned responses.

use crate::config::PollConfig;
use crate::cursor::CursorStore;
use crate::error::{CycleError, FetchError};
use crate::feed::parser::parse_feed;
use crate::feed::types::{FeedResponse, Item, RateMetadata, DEFAULT_RATE_REMAINING};
use crate::feed::FeedSource;
use crate::icon::{IconDelivery, IconFetcher};
use crate::presentation::PresentationSink;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Never re-arm a rate-limit resume sooner than this, even if the server's
/// reset time is already in the past.
const MIN_RESUME_DELAY_S: i64 = 60;

/// Upper bound for configured periods (interval, lookback): ten years.
pub const MAX_PERIOD_S: u64 = 10 * 365 * 24 * 60 * 60;

/// Configured seconds as a duration, clamped to `min..=MAX_PERIOD_S`.
fn period(secs: u64, min: u64) -> Duration {
    let secs = secs.clamp(min, MAX_PERIOD_S);
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    /// Budget exhausted. `resume_at: None` means polling has stopped for good.
    Suspended { resume_at: Option<DateTime<Utc>> },
}

/// Commands accepted by [`Scheduler::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a cycle now (user-triggered refresh).
    Refresh,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A feed fetch is still outstanding.
    InFlight,
    /// The rate budget is exhausted and has not reset yet.
    Suspended,
}

#[derive(Debug)]
pub enum TickOutcome {
    Completed { items: usize, announced: usize },
    Failed(CycleError),
    Skipped(SkipReason),
}

/// Issued by [`Scheduler::begin_cycle`]; hand it back to `finish_cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTicket {
    /// Lower bound of the fetch window.
    pub since: DateTime<Utc>,
    /// Captured before the request goes out. Becomes the new cursor on success.
    pub started_at: DateTime<Utc>,
}

/// Server-advertised request budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateBudget {
    pub remaining: u64,
    pub limit: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl Default for RateBudget {
    fn default() -> Self {
        Self {
            remaining: DEFAULT_RATE_REMAINING,
            limit: None,
            reset_at: None,
        }
    }
}

impl RateBudget {
    pub fn update(&mut self, rate: &RateMetadata) {
        self.remaining = rate.remaining;
        self.limit = rate.limit.or(self.limit);
        self.reset_at = rate.reset_at;
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// The window has rolled over: assume the full limit is available again.
    fn reset(&mut self) {
        self.remaining = self.limit.unwrap_or(DEFAULT_RATE_REMAINING);
        self.reset_at = None;
    }
}

/// Remembers which items were already announced, oldest evicted first.
#[derive(Debug)]
pub struct SeenSet {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashMap<String, Option<DateTime<Utc>>>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashMap::new(),
        }
    }

    /// True if `item` is new or has changed since it was last observed.
    pub fn observe(&mut self, item: &Item) -> bool {
        if let Some(updated_at) = self.seen.get_mut(&item.identifier) {
            if *updated_at == item.updated_at {
                return false;
            }
            *updated_at = item.updated_at;
            return true;
        }

        self.seen.insert(item.identifier.clone(), item.updated_at);
        self.order.push_back(item.identifier.clone());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Snapshot published after every state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollStatus {
    pub state: PollState,
    pub remaining: u64,
    pub cursor: DateTime<Utc>,
    pub next_tick: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub last_error: Option<String>,
}

pub struct Scheduler<S: PresentationSink> {
    feed: Arc<dyn FeedSource>,
    icons: IconFetcher,
    store: Box<dyn CursorStore>,
    sink: S,
    cursor: DateTime<Utc>,
    budget: RateBudget,
    state: PollState,
    seen: SeenSet,
    interval: Duration,
    resume_on_reset: bool,
    next_tick: Option<DateTime<Utc>>,
    cycles: u64,
    last_error: Option<String>,
    status_tx: watch::Sender<PollStatus>,
}

impl<S: PresentationSink> Scheduler<S> {
    /// Loads the cursor from `store`. With nothing saved (or an unreadable
    /// store) the first window starts `initial_lookback_s` ago. The first tick
    /// is due immediately.
    pub fn new(
        feed: Arc<dyn FeedSource>,
        icons: IconFetcher,
        store: Box<dyn CursorStore>,
        sink: S,
        config: &PollConfig,
    ) -> Self {
        let now = Utc::now();
        let fresh = now
            .checked_sub_signed(period(config.initial_lookback_s, 0))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cursor = match store.load() {
            Ok(Some(saved)) => saved,
            Ok(None) => fresh,
            Err(e) => {
                tracing::warn!("failed to load cursor, starting fresh: {:#}", e);
                fresh
            }
        };

        let status = PollStatus {
            state: PollState::Idle,
            remaining: DEFAULT_RATE_REMAINING,
            cursor,
            next_tick: Some(now),
            cycles: 0,
            last_error: None,
        };
        let (status_tx, _) = watch::channel(status);

        Self {
            feed,
            icons,
            store,
            sink,
            cursor,
            budget: RateBudget::default(),
            state: PollState::Idle,
            seen: SeenSet::new(config.seen_capacity),
            interval: period(config.interval_s, 1),
            resume_on_reset: config.resume_on_reset,
            next_tick: Some(now),
            cycles: 0,
            last_error: None,
            status_tx,
        }
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    pub fn next_tick(&self) -> Option<DateTime<Utc>> {
        self.next_tick
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> PollStatus {
        PollStatus {
            state: self.state,
            remaining: self.budget.remaining,
            cursor: self.cursor,
            next_tick: self.next_tick,
            cycles: self.cycles,
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Enter `Fetching`, or refuse if a fetch is outstanding or the budget is
    /// exhausted. A suspension whose reset time has passed is lifted here.
    pub fn begin_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleTicket, SkipReason> {
        match self.state {
            PollState::Fetching => return Err(SkipReason::InFlight),
            PollState::Suspended { resume_at } => {
                let reset_passed = resume_at.is_some_and(|at| now >= at);
                if !(self.resume_on_reset && reset_passed) {
                    return Err(SkipReason::Suspended);
                }
                self.budget.reset();
                tracing::info!(remaining = self.budget.remaining, "rate limit window reset, resuming polling");
            }
            PollState::Idle => {}
        }

        self.state = PollState::Fetching;
        self.publish();
        Ok(CycleTicket {
            since: self.cursor,
            started_at: now,
        })
    }

    /// Apply the result of the fetch started by `ticket` and schedule the next
    /// tick. Only a successfully fetched *and* parsed response advances the
    /// cursor; the budget is refreshed whenever the server answered.
    pub fn finish_cycle(
        &mut self,
        ticket: CycleTicket,
        result: Result<FeedResponse, FetchError>,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let rate = match &result {
            Ok(resp) => Some(&resp.rate),
            Err(e) => e.rate(),
        };
        if let Some(rate) = rate {
            self.budget.update(rate);
            tracing::debug!(remaining = self.budget.remaining, "rate budget updated");
        }

        let parsed = result
            .map_err(CycleError::from)
            .and_then(|resp| parse_feed(&resp.body).map_err(CycleError::from));

        let outcome = match parsed {
            Ok(items) => {
                self.advance_cursor(ticket.started_at);
                let count = items.len();
                let announced = self.present(items);
                self.cycles += 1;
                self.last_error = None;
                tracing::debug!(items = count, announced, "poll cycle complete");
                TickOutcome::Completed {
                    items: count,
                    announced,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "poll cycle failed, cursor unchanged");
                self.last_error = Some(e.to_string());
                TickOutcome::Failed(e)
            }
        };

        if self.budget.is_exhausted() {
            let resume_at = if self.resume_on_reset {
                self.budget
                    .reset_at
                    .map(|at| at.max(now + Duration::seconds(MIN_RESUME_DELAY_S)))
            } else {
                None
            };
            match resume_at {
                Some(at) => tracing::warn!(resume_at = %at, "rate limit exhausted, polling suspended"),
                None => tracing::error!("rate limit exhausted with no known reset, polling halted"),
            }
            self.state = PollState::Suspended { resume_at };
            self.next_tick = resume_at;
        } else {
            self.state = PollState::Idle;
            self.next_tick = ticket.started_at.checked_add_signed(self.interval);
        }

        self.publish();
        outcome
    }

    fn advance_cursor(&mut self, started_at: DateTime<Utc>) {
        // Monotonic even if the wall clock steps backwards
        if started_at > self.cursor {
            self.cursor = started_at;
        }
        if let Err(e) = self.store.save(self.cursor) {
            tracing::warn!("failed to persist cursor: {:#}", e);
        }
    }

    /// Hand the working set to the sink, announce unseen items and fire one
    /// icon request per item. Returns the number announced.
    fn present(&mut self, items: Vec<Item>) -> usize {
        let mut announced = 0;
        for item in &items {
            if self.seen.observe(item) {
                self.sink.announce(item);
                announced += 1;
            }
            self.icons
                .request_icon(item.identifier.clone(), item.icon_url.clone());
        }
        self.sink.populate_menu(items);
        announced
    }

    /// Route a finished icon download to the sink. Failures leave the item
    /// without an icon; stale identifiers are a no-op in the sink.
    ///
    /// Deliveries are matched by identifier only, not by cycle: an icon still
    /// in flight from an earlier cycle attaches to the current slot if the
    /// same identifier came back.
    pub fn deliver_icon(&mut self, delivery: IconDelivery) {
        if let Ok(image) = delivery.result {
            self.sink.attach_icon(&delivery.identifier, image);
        }
    }

    /// Run one full cycle inline.
    pub async fn tick(&mut self) -> TickOutcome {
        let ticket = match self.begin_cycle(Utc::now()) {
            Ok(ticket) => ticket,
            Err(reason) => return TickOutcome::Skipped(reason),
        };
        let result = self.feed.fetch(ticket.since).await;
        self.finish_cycle(ticket, result, Utc::now())
    }

    fn spawn_fetch(
        &mut self,
    ) -> Option<(CycleTicket, JoinHandle<Result<FeedResponse, FetchError>>)> {
        match self.begin_cycle(Utc::now()) {
            Ok(ticket) => {
                let feed = Arc::clone(&self.feed);
                let handle = tokio::spawn(async move { feed.fetch(ticket.since).await });
                Some((ticket, handle))
            }
            Err(reason) => {
                tracing::debug!(?reason, "tick skipped");
                None
            }
        }
    }

    /// Event loop: timer, commands, the in-flight feed fetch and icon
    /// deliveries are all multiplexed here. Returns on `Shutdown` or when the
    /// command channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SchedulerCommand>,
        mut icon_rx: mpsc::UnboundedReceiver<IconDelivery>,
    ) {
        tracing::info!(cursor = %self.cursor, "scheduler started");
        let mut in_flight: Option<(CycleTicket, JoinHandle<Result<FeedResponse, FetchError>>)> =
            None;

        loop {
            let timer_armed = self.next_tick.is_some() && in_flight.is_none();
            let wait = self
                .next_tick
                .and_then(|at| (at - Utc::now()).to_std().ok())
                .unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait), if timer_armed => {
                    in_flight = self.spawn_fetch();
                }
                joined = async {
                    match in_flight.as_mut() {
                        Some((_, handle)) => handle.await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    if let Some((ticket, _)) = in_flight.take() {
                        let result = joined.unwrap_or_else(|e| {
                            Err(FetchError::Transport(format!("feed task failed: {}", e)))
                        });
                        self.finish_cycle(ticket, result, Utc::now());
                    }
                }
                Some(delivery) = icon_rx.recv() => {
                    self.deliver_icon(delivery);
                }
                cmd = commands.recv() => match cmd {
                    Some(SchedulerCommand::Refresh) => {
                        if in_flight.is_some() {
                            tracing::debug!("refresh ignored, fetch already in flight");
                        } else {
                            in_flight = self.spawn_fetch();
                        }
                    }
                    Some(SchedulerCommand::Shutdown) | None => break,
                },
            }
        }

        if let Some((_, handle)) = in_flight.take() {
            handle.abort();
        }
        tracing::info!("scheduler stopped");
    }
}

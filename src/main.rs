use anyhow::{Context, Result};
use chrono::Utc;
use gist_watch::config::{Config, LoggingConfig};
use gist_watch::cursor::FileCursorStore;
use gist_watch::feed::gists::GistsApi;
use gist_watch::humanize::time_ago;
use gist_watch::icon::{HttpIconSource, IconFetcher};
use gist_watch::presentation::LogSink;
use gist_watch::scheduler::{PollStatus, Scheduler, SchedulerCommand};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("invalid log filter")?;

    match &config.file {
        Some(path) => {
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(log_file)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Log each status snapshot the scheduler publishes.
async fn log_status(mut status_rx: watch::Receiver<PollStatus>) {
    while status_rx.changed().await.is_ok() {
        let status = status_rx.borrow_and_update().clone();
        tracing::debug!(
            state = ?status.state,
            remaining = status.remaining,
            cycles = status.cycles,
            cursor_age = %time_ago(status.cursor, Utc::now()),
            "poll status"
        );
    }
}

// Timer, feed fetch and icon fetches all share one thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load_or_default(&Config::default_path())?;
    init_tracing(&config.logging)?;

    let feed = Arc::new(GistsApi::new(&config.feed)?);
    let icon_source = Arc::new(HttpIconSource::new(&config.icons, &config.feed.user_agent)?);
    let (icons, icon_rx) = IconFetcher::new(icon_source, config.icons.max_concurrent);
    let store = Box::new(FileCursorStore::new(&config.cursor.path));

    let scheduler = Scheduler::new(feed, icons, store, LogSink::new(), &config.poll);
    tracing::info!(
        last_update = %time_ago(scheduler.cursor(), Utc::now()),
        interval_s = config.poll.interval_s,
        "gist-watch starting"
    );

    tokio::spawn(log_status(scheduler.subscribe()));

    let (cmd_tx, cmd_rx) = mpsc::channel::<SchedulerCommand>(16);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut usr1 = signal(SignalKind::user_defined1()).context("failed to install SIGUSR1 handler")?;
        let refresh_tx = cmd_tx.clone();
        tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                tracing::info!("SIGUSR1 received, refreshing");
                if refresh_tx.send(SchedulerCommand::Refresh).await.is_err() {
                    break;
                }
            }
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            let _ = cmd_tx.send(SchedulerCommand::Shutdown).await;
        }
    });

    scheduler.run(cmd_rx, icon_rx).await;
    Ok(())
}

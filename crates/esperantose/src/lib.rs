//! Process wiring for the three esperantose binaries.
//!
//! - `esperantose-relay`: one relay cycle, for cron.
//! - `esperantose-watch`: the relay as a long-running loop.
//! - `esperantose-commands`: the inline-query bot.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use esperantose_core::{
    config::{ChannelSource, Config},
    domain::{Published, Question, UnixTime, Watermark},
    driver::{CycleOutcome, DriverConfig, PersistPolicy, PollDriver},
    forward::{ChannelForwarder, InlineAnswerer},
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::UpstreamFetcher,
    watermark::WatermarkStore,
};
use esperantose_stackexchange::{AtomFeed, StackExchangeClient};
use esperantose_telegram::{TelegramClient, UpdatePoller};

/// How far back a relay with no saved watermark starts.
const INITIAL_LOOKBACK_HOURS: i64 = 48;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayMode {
    Once,
    Forever,
}

/// Load config and install logging; shared startup for every binary.
pub fn startup(service: &str) -> anyhow::Result<Arc<Config>> {
    esperantose_core::logging::init(service)?;
    let cfg = Config::load().context("loading configuration")?;
    info!("state directory: {}", cfg.state_dir.display());
    Ok(Arc::new(cfg))
}

fn telegram(cfg: &Config) -> anyhow::Result<TelegramClient> {
    Ok(TelegramClient::new(
        &cfg.telegram_api_base,
        &cfg.api_key,
        cfg.http_timeout,
    )?)
}

fn stackexchange(cfg: &Config) -> anyhow::Result<StackExchangeClient> {
    Ok(StackExchangeClient::new(
        &cfg.stackexchange_api_base,
        &cfg.site,
        cfg.relay_page_size,
        cfg.http_timeout,
    )?)
}

/// Answer inline queries forever. Update ids are persisted after each answer.
pub async fn run_inline_bot(cfg: Arc<Config>) -> anyhow::Result<()> {
    let client = telegram(&cfg)?;
    let poller = UpdatePoller::new(client.clone(), cfg.long_poll_timeout);
    let answerer = InlineAnswerer::new(Arc::new(client), Arc::new(stackexchange(&cfg)?));

    let mut driver = PollDriver::new(
        "inline-bot",
        poller,
        answerer,
        WatermarkStore::new(cfg.update_id_file()),
        DriverConfig {
            persist: PersistPolicy::PerItem,
            fetch_backoff: cfg.fetch_backoff,
            forward_backoff: cfg.forward_backoff,
            idle_interval: None,
        },
    )?;

    info!("inline bot polling for queries");
    driver.run_forever().await?;
    Ok(())
}

/// Relay new questions to the channel from the configured source.
pub async fn run_relay(cfg: Arc<Config>, mode: RelayMode) -> anyhow::Result<()> {
    let raw: Arc<dyn MessagingPort> = Arc::new(telegram(&cfg)?);
    let messenger: Arc<dyn MessagingPort> =
        Arc::new(ThrottledMessenger::new(raw, ThrottleConfig::default()));
    let forwarder = ChannelForwarder::new(messenger, cfg.channel.clone());

    let driver_cfg = DriverConfig {
        persist: cfg.persist_policy,
        fetch_backoff: cfg.fetch_backoff,
        forward_backoff: cfg.forward_backoff,
        idle_interval: Some(cfg.poll_interval),
    };

    match cfg.channel_source {
        ChannelSource::Api => {
            let store = WatermarkStore::new(cfg.timestamp_file())
                .with_default(|| UnixTime::hours_ago(INITIAL_LOOKBACK_HOURS));
            relay(stackexchange(&cfg)?, forwarder, store, driver_cfg, mode).await
        }
        ChannelSource::Feed => {
            let store = WatermarkStore::new(cfg.published_file())
                .with_default(|| Published::hours_ago(INITIAL_LOOKBACK_HOURS));
            let feed = AtomFeed::new(&cfg.feed_url, cfg.http_timeout)?;
            relay(feed, forwarder, store, driver_cfg, mode).await
        }
    }
}

async fn relay<F, P>(
    fetcher: F,
    forwarder: ChannelForwarder,
    store: WatermarkStore<P>,
    driver_cfg: DriverConfig,
    mode: RelayMode,
) -> anyhow::Result<()>
where
    F: UpstreamFetcher<Item = Question<P>>,
    P: Watermark,
{
    let mut driver = PollDriver::new("relay", fetcher, forwarder, store, driver_cfg)?;

    match mode {
        RelayMode::Forever => {
            driver.run_forever().await?;
            Ok(())
        }
        RelayMode::Once => match driver.run_once().await {
            CycleOutcome::Progressed { forwarded } => {
                info!("relay: forwarded {forwarded} question(s)");
                Ok(())
            }
            // The next scheduled run retries from the same watermark.
            CycleOutcome::Backoff { reason, .. } => {
                warn!("relay: {reason}; leaving retry to the next run");
                Ok(())
            }
            CycleOutcome::Fatal(e) => Err(e.into()),
        },
    }
}

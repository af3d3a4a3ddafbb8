//! Poll driver: fetch, filter, forward, persist, with backoff on failure.
//!
//! One cycle walks `Idle -> Fetching -> Filtering -> Forwarding -> Persisting -> Idle`.
//! Fetch and forward failures end the cycle in `Backoff`; anything else is fatal.
//! The watermark only moves past items the messaging endpoint acknowledged.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    dedup::select_new,
    domain::Positioned,
    errors::Error,
    ports::{Forwarder, UpstreamFetcher},
    watermark::WatermarkStore,
    Result,
};

type Position<F> = <<F as UpstreamFetcher>::Item as Positioned>::Position;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Fetching,
    Filtering,
    Forwarding,
    Persisting,
    Backoff,
}

/// When the watermark is written to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistPolicy {
    /// After every forwarded item; a mid-batch failure keeps earlier progress.
    PerItem,
    /// Once, after the whole batch succeeded; a mid-batch failure re-delivers the batch.
    PerBatch,
}

#[derive(Clone, Copy, Debug)]
pub struct DriverConfig {
    pub persist: PersistPolicy,
    pub fetch_backoff: Duration,
    pub forward_backoff: Duration,
    /// Pause after a successful cycle. `None` for long-poll sources, which block on their own.
    pub idle_interval: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            persist: PersistPolicy::PerItem,
            fetch_backoff: Duration::from_secs(60),
            forward_backoff: Duration::from_secs(30),
            idle_interval: None,
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Progressed { forwarded: usize },
    Backoff { reason: Error, delay: Duration },
    Fatal(Error),
}

pub struct PollDriver<F: UpstreamFetcher, D> {
    name: &'static str,
    fetcher: F,
    forwarder: D,
    store: WatermarkStore<Position<F>>,
    watermark: Option<Position<F>>,
    cfg: DriverConfig,
    state: DriverState,
}

impl<F, D> PollDriver<F, D>
where
    F: UpstreamFetcher,
    D: Forwarder<F::Item>,
{
    /// Restore the watermark and build a driver. A corrupt watermark file is fatal here.
    pub fn new(
        name: &'static str,
        fetcher: F,
        forwarder: D,
        store: WatermarkStore<Position<F>>,
        cfg: DriverConfig,
    ) -> Result<Self> {
        let watermark = store.load()?;
        match &watermark {
            Some(w) => info!("{name}: resuming after {w} ({})", store.path().display()),
            None => info!("{name}: no watermark yet ({})", store.path().display()),
        }
        Ok(Self {
            name,
            fetcher,
            forwarder,
            store,
            watermark,
            cfg,
            state: DriverState::Idle,
        })
    }

    pub fn watermark(&self) -> Option<&Position<F>> {
        self.watermark.as_ref()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn transition(&mut self, next: DriverState) {
        debug!("{}: {:?} -> {:?}", self.name, self.state, next);
        self.state = next;
    }

    /// Run exactly one cycle without sleeping.
    pub async fn run_once(&mut self) -> CycleOutcome {
        match self.cycle().await {
            Ok(forwarded) => {
                self.transition(DriverState::Idle);
                CycleOutcome::Progressed { forwarded }
            }
            Err(e) if e.is_retryable() => {
                let delay = match e {
                    Error::Forward(_) => self.cfg.forward_backoff,
                    _ => self.cfg.fetch_backoff,
                };
                self.transition(DriverState::Backoff);
                CycleOutcome::Backoff { reason: e, delay }
            }
            Err(e) => {
                self.transition(DriverState::Idle);
                CycleOutcome::Fatal(e)
            }
        }
    }

    /// Loop until a fatal error. Fetch/forward failures are logged and retried.
    pub async fn run_forever(&mut self) -> Result<()> {
        loop {
            match self.run_once().await {
                CycleOutcome::Progressed { forwarded } => {
                    if forwarded > 0 {
                        info!("{}: forwarded {forwarded} item(s)", self.name);
                    }
                    if let Some(pause) = self.cfg.idle_interval {
                        sleep(pause).await;
                    }
                }
                CycleOutcome::Backoff { reason, delay } => {
                    warn!(
                        "{}: {reason}; retrying in {}s",
                        self.name,
                        delay.as_secs()
                    );
                    sleep(delay).await;
                    self.transition(DriverState::Idle);
                }
                CycleOutcome::Fatal(e) => {
                    error!("{}: giving up: {e}", self.name);
                    return Err(e);
                }
            }
        }
    }

    async fn cycle(&mut self) -> Result<usize> {
        self.transition(DriverState::Fetching);
        let fetched = self.fetcher.fetch(self.watermark.as_ref()).await?;

        self.transition(DriverState::Filtering);
        let selection = select_new(self.watermark.as_ref(), fetched)?;
        if selection.is_empty() {
            return Ok(0);
        }

        let mut forwarded = 0usize;
        let mut pending: Option<Position<F>> = None;
        for item in &selection.items {
            self.transition(DriverState::Forwarding);
            // Remaining items are abandoned; earlier ones were already persisted (per-item).
            self.forwarder.forward(item).await?;
            forwarded += 1;

            let pos = item.position().clone();
            match self.cfg.persist {
                PersistPolicy::PerItem => self.advance(pos)?,
                PersistPolicy::PerBatch => pending = Some(pos),
            }
        }

        if let Some(pos) = pending {
            self.advance(pos)?;
        }
        // Past records the filter dropped as non-deliverable.
        if let Some(horizon) = selection.horizon {
            self.advance(horizon)?;
        }

        Ok(forwarded)
    }

    fn advance(&mut self, pos: Position<F>) -> Result<()> {
        if self.watermark.as_ref().is_some_and(|w| &pos <= w) {
            return Ok(());
        }
        self.transition(DriverState::Persisting);
        self.store.save(&pos)?;
        debug!("{}: watermark -> {pos}", self.name);
        self.watermark = Some(pos);
        Ok(())
    }
}

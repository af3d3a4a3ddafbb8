use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    formatting::InlineArticle,
    messaging::{port::MessagingPort, types::ChatTarget},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between posts to the same channel.
    pub channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Telegram allows about 20 messages per minute into one channel.
        Self {
            channel_min_interval: Duration::from_millis(3100),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces out channel posts.
///
/// A relay batch of ten questions would otherwise hit the channel in a burst.
/// Inline answers are not throttled: each one is a reply to a distinct user query.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    limiter: Mutex<IntervalLimiter>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            limiter: Mutex::new(IntervalLimiter::new(cfg.channel_min_interval)),
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_text(&self, chat: &ChatTarget, text: &str) -> Result<()> {
        let wait = { self.limiter.lock().await.reserve() };
        if wait > Duration::from_millis(0) {
            sleep(wait).await;
        }
        self.inner.send_text(chat, text).await
    }

    async fn answer_inline_query(&self, query_id: &str, results: &[InlineArticle]) -> Result<()> {
        self.inner.answer_inline_query(query_id, results).await
    }
}

//! Forwarders: turn a candidate item into an outbound Bot API call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    domain::{Question, Update, Watermark},
    errors::Error,
    formatting::{inline_articles, render_post, INLINE_RESULT_LIMIT},
    messaging::{port::MessagingPort, types::ChatTarget},
    ports::{Forwarder, QuestionSearch},
    Result,
};

/// Posts each new question to a channel.
pub struct ChannelForwarder {
    messenger: Arc<dyn MessagingPort>,
    channel: ChatTarget,
}

impl ChannelForwarder {
    pub fn new(messenger: Arc<dyn MessagingPort>, channel: ChatTarget) -> Self {
        Self { messenger, channel }
    }
}

#[async_trait]
impl<P: Watermark> Forwarder<Question<P>> for ChannelForwarder {
    async fn forward(&self, item: &Question<P>) -> Result<()> {
        let text = render_post(&item.title, &item.link);
        self.messenger.send_text(&self.channel, &text).await?;
        info!(position = %item.position, link = %item.link, "posted question to {}", self.channel);
        Ok(())
    }
}

/// Answers inline queries with search hits (or the most recent questions).
pub struct InlineAnswerer {
    messenger: Arc<dyn MessagingPort>,
    search: Arc<dyn QuestionSearch>,
}

impl InlineAnswerer {
    pub fn new(messenger: Arc<dyn MessagingPort>, search: Arc<dyn QuestionSearch>) -> Self {
        Self { messenger, search }
    }
}

#[async_trait]
impl Forwarder<Update> for InlineAnswerer {
    async fn forward(&self, item: &Update) -> Result<()> {
        let Some(query) = item.inline_query() else {
            return Ok(());
        };

        let hits = match query.search_text() {
            Some(text) => self.search.search(text, INLINE_RESULT_LIMIT).await,
            None => self.search.recent(INLINE_RESULT_LIMIT).await,
        }
        // A failed search aborts the cycle like a failed answer would.
        .map_err(|e| match e {
            Error::Fetch(msg) => Error::Forward(format!("question search failed: {msg}")),
            other => other,
        })?;

        let results = inline_articles(&hits);
        debug!(
            update_id = %item.update_id,
            query = %query.query_text,
            results = results.len(),
            "answering inline query"
        );
        self.messenger
            .answer_inline_query(&query.query_id, &results)
            .await
    }
}

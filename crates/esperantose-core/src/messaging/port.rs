use async_trait::async_trait;

use crate::{formatting::InlineArticle, messaging::types::ChatTarget, Result};

/// Outbound side of the bot.
///
/// Implementations must return `Error::Forward` unless the endpoint
/// acknowledged the call with `ok: true`.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat: &ChatTarget, text: &str) -> Result<()>;

    async fn answer_inline_query(&self, query_id: &str, results: &[InlineArticle]) -> Result<()>;
}

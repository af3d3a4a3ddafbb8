use async_trait::async_trait;

use crate::{
    domain::{Positioned, QuestionHit},
    Result,
};

/// One upstream request per poll cycle.
///
/// `since` is the current watermark. Implementations may use it as a
/// server-side lower bound; the dedup filter applies the exact cut either way.
/// All failures must surface as `Error::Fetch`.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    type Item: Positioned + Send + Sync;

    async fn fetch(
        &self,
        since: Option<&<Self::Item as Positioned>::Position>,
    ) -> Result<Vec<Self::Item>>;
}

/// Delivers one candidate item. Failures must surface as `Error::Forward`.
#[async_trait]
pub trait Forwarder<I>: Send + Sync {
    async fn forward(&self, item: &I) -> Result<()>;
}

/// Question search used to answer inline queries.
#[async_trait]
pub trait QuestionSearch: Send + Sync {
    /// Most recently active questions.
    async fn recent(&self, limit: usize) -> Result<Vec<QuestionHit>>;

    /// Questions whose title matches `text`, by relevance.
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<QuestionHit>>;
}

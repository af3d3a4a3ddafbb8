//! `getUpdates` long-poll fetcher for the inline bot.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use esperantose_core::{
    domain::{InlineQuery, Update, UpdateId, UpdateKind},
    errors::Error,
    ports::UpstreamFetcher,
    Result,
};

use crate::TelegramClient;

pub struct UpdatePoller {
    client: TelegramClient,
    /// Server-side hold time for each long-poll.
    hold: Duration,
}

impl UpdatePoller {
    pub fn new(client: TelegramClient, hold: Duration) -> Self {
        Self { client, hold }
    }
}

pub(crate) fn get_updates_body(since: Option<UpdateId>, hold: Duration) -> Value {
    let mut body = json!({
        "timeout": hold.as_secs(),
        "allowed_updates": ["inline_query"],
    });
    if let Some(last) = since {
        body["offset"] = json!(last.next());
    }
    body
}

/// Validate the `result` list of a `getUpdates` response.
///
/// Update ids must be gapless for the offset to work, so any malformed record
/// fails the whole fetch instead of being skipped.
pub fn parse_updates(result: &Value) -> Result<Vec<Update>> {
    let records = result
        .as_array()
        .ok_or_else(|| Error::Fetch("getUpdates: result is not a list".to_string()))?;

    records.iter().map(parse_update).collect()
}

fn parse_update(rec: &Value) -> Result<Update> {
    let update_id = rec
        .get("update_id")
        .and_then(Value::as_i64)
        .map(UpdateId)
        .ok_or_else(|| {
            Error::Fetch(format!(
                "getUpdates: record without integer update_id: {rec}"
            ))
        })?;

    let Some(q) = rec.get("inline_query") else {
        return Ok(Update {
            update_id,
            kind: UpdateKind::Ignored,
        });
    };

    let query_id = q.get("id").and_then(Value::as_str);
    let query_text = q.get("query").and_then(Value::as_str);
    match (query_id, query_text) {
        (Some(id), Some(text)) => Ok(Update {
            update_id,
            kind: UpdateKind::InlineQuery(InlineQuery {
                query_id: id.to_string(),
                query_text: text.to_string(),
            }),
        }),
        _ => Err(Error::Fetch(format!(
            "getUpdates: malformed inline_query in update {update_id}"
        ))),
    }
}

#[async_trait]
impl UpstreamFetcher for UpdatePoller {
    type Item = Update;

    async fn fetch(&self, since: Option<&UpdateId>) -> Result<Vec<Update>> {
        let body = get_updates_body(since.copied(), self.hold);
        let result = self
            .client
            .call("getUpdates", &body, Some(self.hold))
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        parse_updates(&result)
    }
}

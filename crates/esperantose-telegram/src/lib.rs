//! Telegram Bot API adapter.
//!
//! Implements the `esperantose-core` MessagingPort (`sendMessage`,
//! `answerInlineQuery`) and the `getUpdates` long-poll fetcher over plain
//! JSON-over-HTTPS with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::warn;

pub mod updates;

pub use updates::UpdatePoller;

use esperantose_core::{
    errors::Error,
    formatting::InlineArticle,
    messaging::{port::MessagingPort, types::ChatTarget},
    Result,
};

/// Upper bound on a `retry_after` we are willing to wait inside one call.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    /// `https://api.telegram.org/bot<token>`
    base: String,
    http_timeout: Duration,
}

/// Why a Bot API call failed; callers map it into a fetch or forward error.
#[derive(Debug)]
pub(crate) enum CallError {
    Transport(String),
    Rejected {
        description: String,
        retry_after: Option<Duration>,
    },
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Transport(msg) => f.write_str(msg),
            CallError::Rejected { description, .. } => write!(f, "rejected: {description}"),
        }
    }
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, http_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            http_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }

    /// POST a JSON body and return `result` from an `ok: true` envelope.
    pub(crate) async fn call<B: Serialize + ?Sized + Sync>(
        &self,
        method: &str,
        body: &B,
        hold: Option<Duration>,
    ) -> std::result::Result<Value, CallError> {
        let mut req = self
            .http
            .post(self.method_url(method))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/json; charset=utf-8",
            )
            .body(serde_json::to_vec(body).map_err(|e| CallError::Transport(e.to_string()))?);
        if let Some(hold) = hold {
            // Long-poll: the server holds the request for up to `hold`.
            req = req.timeout(hold + self.http_timeout);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CallError::Transport(format!("{method} request error: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CallError::Transport(format!("{method} read error: {e}")))?;
        let envelope: Value = serde_json::from_slice(&bytes).map_err(|e| {
            CallError::Transport(format!("{method} returned undecodable body ({status}): {e}"))
        })?;

        unwrap_envelope(method, envelope)
    }

    /// [`call`](Self::call) with a single retry when Telegram asks us to slow down.
    async fn call_with_retry<B: Serialize + ?Sized + Sync>(
        &self,
        method: &str,
        body: &B,
    ) -> std::result::Result<Value, CallError> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match self.call(method, body, None).await {
                Err(CallError::Rejected {
                    retry_after: Some(d),
                    ..
                }) if attempts < MAX_RETRIES && d <= MAX_RETRY_AFTER => {
                    attempts += 1;
                    warn!("{method}: rate limited, retrying in {}s", d.as_secs());
                    sleep(d).await;
                }
                other => return other,
            }
        }
    }
}

pub(crate) fn unwrap_envelope(
    method: &str,
    mut envelope: Value,
) -> std::result::Result<Value, CallError> {
    if envelope.get("ok") == Some(&Value::Bool(true)) {
        return Ok(envelope.get_mut("result").map(Value::take).unwrap_or(Value::Null));
    }

    let description = envelope
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("response without ok: true")
        .to_string();
    let retry_after = envelope
        .pointer("/parameters/retry_after")
        .and_then(Value::as_u64)
        .map(Duration::from_secs);
    Err(CallError::Rejected {
        description: format!("{method}: {description}"),
        retry_after,
    })
}

pub(crate) fn send_message_body(chat: &ChatTarget, text: &str) -> Value {
    json!({ "chat_id": chat, "text": text })
}

pub(crate) fn answer_inline_query_body(query_id: &str, results: &[InlineArticle]) -> Value {
    json!({ "inline_query_id": query_id, "results": results })
}

#[async_trait]
impl MessagingPort for TelegramClient {
    async fn send_text(&self, chat: &ChatTarget, text: &str) -> Result<()> {
        self.call_with_retry("sendMessage", &send_message_body(chat, text))
            .await
            .map(|_| ())
            .map_err(|e| Error::Forward(e.to_string()))
    }

    async fn answer_inline_query(&self, query_id: &str, results: &[InlineArticle]) -> Result<()> {
        self.call_with_retry(
            "answerInlineQuery",
            &answer_inline_query_body(query_id, results),
        )
        .await
        .map(|_| ())
        .map_err(|e| Error::Forward(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esperantose_core::domain::QuestionHit;

    #[test]
    fn method_urls_embed_the_token() {
        let c = TelegramClient::new("https://api.telegram.org/", "123:abc", Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            c.method_url("getUpdates"),
            "https://api.telegram.org/bot123:abc/getUpdates"
        );
    }

    #[test]
    fn ok_envelope_yields_result() {
        let v = unwrap_envelope("sendMessage", json!({"ok": true, "result": {"message_id": 3}}))
            .unwrap();
        assert_eq!(v, json!({"message_id": 3}));
    }

    #[test]
    fn non_ok_envelope_is_rejected_with_description() {
        let err = unwrap_envelope(
            "sendMessage",
            json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "rejected: sendMessage: Bad Request: chat not found");
    }

    #[test]
    fn missing_ok_is_rejected() {
        assert!(unwrap_envelope("sendMessage", json!({"result": []})).is_err());
        assert!(unwrap_envelope("sendMessage", json!({"ok": "true"})).is_err());
    }

    #[test]
    fn retry_after_is_extracted() {
        match unwrap_envelope(
            "sendMessage",
            json!({"ok": false, "description": "Too Many Requests", "parameters": {"retry_after": 7}}),
        ) {
            Err(CallError::Rejected { retry_after, .. }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn send_message_body_targets_the_channel() {
        let body = send_message_body(
            &ChatTarget::Username("@esperanto_se_demandoj".into()),
            "Saluton\nhttp://x/5",
        );
        assert_eq!(
            body,
            json!({"chat_id": "@esperanto_se_demandoj", "text": "Saluton\nhttp://x/5"})
        );
    }

    #[test]
    fn answer_body_carries_articles() {
        let arts = esperantose_core::formatting::inline_articles(&[QuestionHit {
            question_id: 9,
            title: "Kial?".into(),
            link: "http://x/9".into(),
        }]);
        let body = answer_inline_query_body("abc", &arts);
        assert_eq!(body["inline_query_id"], "abc");
        assert_eq!(body["results"][0]["type"], "article");
        assert_eq!(body["results"][0]["id"], "9");
        assert_eq!(
            body["results"][0]["input_message_content"]["message_text"],
            "Kial?\nhttp://x/9"
        );
    }
}

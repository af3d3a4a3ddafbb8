//! Stack Exchange adapters: the REST API (question relay and inline search)
//! and the site Atom feed.
//!
//! The API always answers with a gzip-compressed JSON body, whatever the
//! request's `Accept-Encoding`, so bodies are inflated here with `flate2`.

use std::{
    io::Read,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde_json::Value;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

pub mod feed;

pub use feed::AtomFeed;

use esperantose_core::{
    domain::{Question, QuestionHit, UnixTime},
    errors::Error,
    ports::{QuestionSearch, UpstreamFetcher},
    Result,
};

#[derive(Clone, Debug)]
pub struct StackExchangeClient {
    http: reqwest::Client,
    api_base: String,
    site: String,
    page_size: u32,
    /// No request may be sent before this instant (the API's `backoff` field).
    quiet_until: Arc<Mutex<Option<Instant>>>,
}

impl StackExchangeClient {
    pub fn new(api_base: &str, site: &str, page_size: u32, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            site: site.to_string(),
            page_size,
            quiet_until: Arc::new(Mutex::new(None)),
        })
    }

    /// Oldest-first questions created at or after `since`.
    pub(crate) fn relay_request(&self, since: Option<UnixTime>) -> reqwest::RequestBuilder {
        let mut params = vec![
            ("order", "asc".to_string()),
            ("sort", "creation".to_string()),
            ("site", self.site.clone()),
            ("pagesize", self.page_size.to_string()),
        ];
        if let Some(since) = since {
            params.push(("fromdate", since.0.to_string()));
        }
        self.http
            .get(format!("{}/questions", self.api_base))
            .query(&params)
    }

    pub(crate) fn recent_request(&self, limit: usize) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/questions", self.api_base))
            .query(&[
                ("order", "desc".to_string()),
                ("sort", "activity".to_string()),
                ("site", self.site.clone()),
                ("pagesize", limit.to_string()),
            ])
    }

    pub(crate) fn search_request(&self, text: &str, limit: usize) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/search", self.api_base))
            .query(&[
                ("order", "desc".to_string()),
                ("sort", "relevance".to_string()),
                ("site", self.site.clone()),
                ("pagesize", limit.to_string()),
                ("intitle", text.to_string()),
            ])
    }

    /// Remember a server-requested pause; the longest pending one wins.
    pub(crate) fn note_backoff(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut guard = self.quiet_until.lock().unwrap_or_else(|e| e.into_inner());
        if guard.map_or(true, |cur| cur < until) {
            *guard = Some(until);
        }
    }

    /// Sleep out any pause the API asked for on an earlier response.
    pub(crate) async fn wait_for_backoff(&self) {
        let until = self
            .quiet_until
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(until) = until {
            if until > Instant::now() {
                info!("stackexchange: honouring backoff before next request");
                sleep_until(until).await;
            }
        }
    }

    async fn get_json(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        self.wait_for_backoff().await;
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("stackexchange request error: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("stackexchange read error: {e}")))?;

        let v = decode_json_body(&bytes)
            .map_err(|e| Error::Fetch(format!("stackexchange body ({status}): {e}")))?;
        if let Some(delay) = check_api_envelope(&v)? {
            self.note_backoff(delay);
        }
        Ok(v)
    }
}

/// Inflate (when gzip magic is present) and parse a JSON body.
pub(crate) fn decode_json_body(bytes: &[u8]) -> std::result::Result<Value, String> {
    let text = maybe_gunzip(bytes)?;
    serde_json::from_str(&text).map_err(|e| format!("invalid json: {e}"))
}

pub(crate) fn maybe_gunzip(bytes: &[u8]) -> std::result::Result<String, String> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut out = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut out)
            .map_err(|e| format!("gzip decode failed: {e}"))?;
        Ok(out)
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|e| format!("body is not utf-8: {e}"))
    }
}

/// Reject API error envelopes; return the `backoff` the API asked for, if any.
pub(crate) fn check_api_envelope(v: &Value) -> Result<Option<Duration>> {
    if let Some(id) = v.get("error_id").and_then(Value::as_i64) {
        let name = v.get("error_name").and_then(Value::as_str).unwrap_or("error");
        let msg = v
            .get("error_message")
            .and_then(Value::as_str)
            .unwrap_or("");
        return Err(Error::Fetch(format!(
            "stackexchange api error {id} ({name}): {msg}"
        )));
    }
    let backoff = v.get("backoff").and_then(Value::as_u64).map(|secs| {
        warn!("stackexchange asked to back off for {secs}s");
        Duration::from_secs(secs)
    });
    if let Some(left) = v.get("quota_remaining").and_then(Value::as_u64) {
        if left < 10 {
            warn!("stackexchange quota nearly exhausted: {left} requests left");
        }
    }
    Ok(backoff)
}

fn items(v: &Value) -> Result<&Vec<Value>> {
    v.get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Fetch("stackexchange response without items".to_string()))
}

/// Relay items. Entries lacking `link`, `title` or `creation_date` are skipped.
pub fn parse_relay_items(v: &Value) -> Result<Vec<Question<UnixTime>>> {
    Ok(items(v)?
        .iter()
        .filter_map(|entry| {
            Some(Question {
                position: UnixTime(entry.get("creation_date")?.as_i64()?),
                title: entry.get("title")?.as_str()?.to_string(),
                link: entry.get("link")?.as_str()?.to_string(),
                question_id: entry.get("question_id").and_then(Value::as_u64),
            })
        })
        .collect())
}

/// Search hits. Unlike relay items, a hit missing a field fails the whole answer.
pub fn parse_hits(v: &Value) -> Result<Vec<QuestionHit>> {
    items(v)?
        .iter()
        .map(|entry| {
            let question_id = entry.get("question_id").and_then(Value::as_u64);
            let title = entry.get("title").and_then(Value::as_str);
            let link = entry.get("link").and_then(Value::as_str);
            match (question_id, title, link) {
                (Some(question_id), Some(title), Some(link)) => Ok(QuestionHit {
                    question_id,
                    title: title.to_string(),
                    link: link.to_string(),
                }),
                _ => Err(Error::Fetch(format!("malformed search hit: {entry}"))),
            }
        })
        .collect()
}

#[async_trait]
impl UpstreamFetcher for StackExchangeClient {
    type Item = Question<UnixTime>;

    async fn fetch(&self, since: Option<&UnixTime>) -> Result<Vec<Question<UnixTime>>> {
        let v = self.get_json(self.relay_request(since.copied())).await?;
        parse_relay_items(&v)
    }
}

#[async_trait]
impl QuestionSearch for StackExchangeClient {
    async fn recent(&self, limit: usize) -> Result<Vec<QuestionHit>> {
        let v = self.get_json(self.recent_request(limit)).await?;
        parse_hits(&v)
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<QuestionHit>> {
        let v = self.get_json(self.search_request(text, limit)).await?;
        parse_hits(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use serde_json::json;
    use std::io::Write;

    fn client() -> StackExchangeClient {
        StackExchangeClient::new(
            "https://api.stackexchange.com/2.2/",
            "esperanto",
            10,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn url(req: reqwest::RequestBuilder) -> String {
        req.build().unwrap().url().to_string()
    }

    #[test]
    fn relay_url_uses_fromdate_lower_bound() {
        assert_eq!(
            url(client().relay_request(Some(UnixTime(1700000000)))),
            "https://api.stackexchange.com/2.2/questions?order=asc&sort=creation&site=esperanto&pagesize=10&fromdate=1700000000"
        );
    }

    #[test]
    fn recent_url_sorts_by_activity() {
        assert_eq!(
            url(client().recent_request(5)),
            "https://api.stackexchange.com/2.2/questions?order=desc&sort=activity&site=esperanto&pagesize=5"
        );
    }

    #[test]
    fn search_url_escapes_text() {
        assert_eq!(
            url(client().search_request("ĉu vi", 5)),
            "https://api.stackexchange.com/2.2/search?order=desc&sort=relevance&site=esperanto&pagesize=5&intitle=%C4%89u+vi"
        );
    }

    #[test]
    fn gzip_bodies_are_inflated() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(br#"{"items": []}"#).unwrap();
        let gz = enc.finish().unwrap();
        assert_eq!(decode_json_body(&gz).unwrap(), json!({"items": []}));
    }

    #[test]
    fn plain_bodies_pass_through() {
        assert_eq!(decode_json_body(br#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        assert!(decode_json_body(b"<html>").is_err());
    }

    #[test]
    fn api_error_envelope_is_a_fetch_error() {
        let v = json!({"error_id": 502, "error_name": "throttle_violation", "error_message": "too many requests"});
        assert!(matches!(check_api_envelope(&v), Err(Error::Fetch(_))));
    }

    #[test]
    fn backoff_field_is_returned() {
        assert_eq!(
            check_api_envelope(&json!({"items": [], "backoff": 10})).unwrap(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(check_api_envelope(&json!({"items": []})).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn next_request_waits_out_the_requested_backoff() {
        let c = client();
        c.note_backoff(Duration::from_secs(3));
        c.note_backoff(Duration::from_secs(10));
        c.note_backoff(Duration::from_secs(5));

        let started = Instant::now();
        c.wait_for_backoff().await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));

        // Consumed: the following request goes out immediately.
        let started = Instant::now();
        c.wait_for_backoff().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn relay_items_skip_incomplete_entries() {
        let v = json!({"items": [
            {"question_id": 1, "creation_date": 100, "title": "Unua", "link": "http://x/1"},
            {"question_id": 2, "creation_date": 101, "link": "http://x/2"},
            {"question_id": 3, "title": "Tria", "link": "http://x/3"},
            {"creation_date": 104, "title": "Kvara", "link": "http://x/4"}
        ]});
        let qs = parse_relay_items(&v).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].position, UnixTime(100));
        assert_eq!(qs[0].question_id, Some(1));
        assert_eq!(qs[1].position, UnixTime(104));
        assert_eq!(qs[1].question_id, None);
    }

    #[test]
    fn missing_items_is_a_fetch_error() {
        assert!(matches!(
            parse_relay_items(&json!({"has_more": false})),
            Err(Error::Fetch(_))
        ));
    }

    #[test]
    fn hits_require_every_field() {
        let ok = json!({"items": [{"question_id": 5, "title": "T", "link": "L"}]});
        assert_eq!(
            parse_hits(&ok).unwrap(),
            vec![QuestionHit {
                question_id: 5,
                title: "T".into(),
                link: "L".into()
            }]
        );
        let bad = json!({"items": [{"question_id": 5, "title": "T"}]});
        assert!(matches!(parse_hits(&bad), Err(Error::Fetch(_))));
    }
}

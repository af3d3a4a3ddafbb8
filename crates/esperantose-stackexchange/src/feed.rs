//! Atom feed source (`https://<site>.stackexchange.com/feeds`).
//!
//! Only `entry/published`, `entry/link/@href`, `entry/title` and `entry/id` are
//! read, so a few anchored regexes cover the whole format.

use std::{sync::OnceLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;

use esperantose_core::{
    domain::{Published, Question},
    errors::Error,
    ports::UpstreamFetcher,
    Result,
};

use crate::maybe_gunzip;

#[derive(Clone, Debug)]
pub struct AtomFeed {
    http: reqwest::Client,
    url: String,
}

impl AtomFeed {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

fn entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>").expect("valid regex"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").expect("valid regex"))
}

fn published_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<published>\s*(.*?)\s*</published>").expect("valid regex")
    })
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<link\b[^>]*\bhref\s*=\s*"([^"]*)""#).expect("valid regex"))
}

fn question_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<id>[^<]*/q/(\d+)\s*</id>").expect("valid regex"))
}

fn strip_cdata(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix("<![CDATA[")
        .and_then(|r| r.strip_suffix("]]>"))
        .unwrap_or(raw)
        .trim()
}

/// Parse feed entries. Entries missing a field or with a bad timestamp are skipped.
pub fn parse_feed(xml: &str) -> Vec<Question<Published>> {
    entry_re()
        .captures_iter(xml)
        .filter_map(|cap| {
            let body = cap.get(1)?.as_str();
            let published =
                Published::parse_rfc3339(published_re().captures(body)?.get(1)?.as_str())?;
            let title = strip_cdata(title_re().captures(body)?.get(1)?.as_str()).to_string();
            let href = link_re().captures(body)?.get(1)?.as_str();
            let link = html_escape::decode_html_entities(href).into_owned();
            let question_id = question_id_re()
                .captures(body)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok());
            Some(Question {
                position: published,
                title,
                link,
                question_id,
            })
        })
        .collect()
}

#[async_trait]
impl UpstreamFetcher for AtomFeed {
    type Item = Question<Published>;

    async fn fetch(&self, _since: Option<&Published>) -> Result<Vec<Question<Published>>> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("feed request error: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Fetch(format!("feed returned {}", resp.status())));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("feed read error: {e}")))?;
        let xml = maybe_gunzip(&bytes).map_err(|e| Error::Fetch(format!("feed body: {e}")))?;
        if !xml.contains("<feed") {
            return Err(Error::Fetch("feed body is not an Atom document".to_string()));
        }
        Ok(parse_feed(&xml))
    }
}

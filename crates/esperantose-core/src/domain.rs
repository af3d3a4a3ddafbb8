use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// A persisted dedup boundary.
///
/// Each loop stores exactly one kind of watermark; the on-disk form is a single
/// text line produced by [`Watermark::encode`].
pub trait Watermark: Ord + Clone + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Parse the trimmed file contents. Returns a human-readable reason on failure.
    fn decode(raw: &str) -> std::result::Result<Self, String>;

    fn encode(&self) -> String;
}

/// Bot API update id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateId(pub i64);

impl UpdateId {
    /// Offset for the next `getUpdates` call.
    pub fn next(self) -> i64 {
        self.0 + 1
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Watermark for UpdateId {
    fn decode(raw: &str) -> std::result::Result<Self, String> {
        raw.parse::<i64>()
            .map(UpdateId)
            .map_err(|e| format!("expected an update id, got {raw:?}: {e}"))
    }

    fn encode(&self) -> String {
        self.0.to_string()
    }
}

/// Seconds since the Unix epoch (Stack Exchange `creation_date`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnixTime(pub i64);

impl UnixTime {
    pub fn now() -> Self {
        UnixTime(Utc::now().timestamp())
    }

    pub fn hours_ago(hours: i64) -> Self {
        UnixTime(Utc::now().timestamp() - hours * 60 * 60)
    }
}

impl fmt::Display for UnixTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Watermark for UnixTime {
    fn decode(raw: &str) -> std::result::Result<Self, String> {
        raw.parse::<i64>()
            .map(UnixTime)
            .map_err(|e| format!("expected a unix timestamp, got {raw:?}: {e}"))
    }

    fn encode(&self) -> String {
        self.0.to_string()
    }
}

/// Atom `published` instant, stored as RFC3339.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Published(pub DateTime<Utc>);

impl Published {
    pub fn hours_ago(hours: i64) -> Self {
        Published(Utc::now() - chrono::Duration::hours(hours))
    }

    pub fn parse_rfc3339(raw: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|d| Published(d.with_timezone(&Utc)))
    }

    pub fn from_unix(secs: i64) -> Option<Self> {
        Utc.timestamp_opt(secs, 0).single().map(Published)
    }
}

impl fmt::Display for Published {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Watermark for Published {
    fn decode(raw: &str) -> std::result::Result<Self, String> {
        Published::parse_rfc3339(raw)
            .ok_or_else(|| format!("expected an RFC3339 timestamp, got {raw:?}"))
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

/// Anything the dedup filter can order against a watermark.
pub trait Positioned {
    type Position: Watermark;

    fn position(&self) -> &Self::Position;

    /// Whether the item should reach the forwarder. Non-deliverable items still
    /// move the watermark once their batch completes.
    fn is_deliverable(&self) -> bool {
        true
    }
}

/// A question announced on the site, positioned by its creation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question<P> {
    pub position: P,
    /// Raw title as served upstream (may contain HTML entities).
    pub title: String,
    pub link: String,
    pub question_id: Option<u64>,
}

impl<P: Watermark> Positioned for Question<P> {
    type Position = P;

    fn position(&self) -> &P {
        &self.position
    }
}

/// Inline query typed into the bot's search box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineQuery {
    pub query_id: String,
    pub query_text: String,
}

impl InlineQuery {
    /// Blank queries ask for the most recent questions instead of a search.
    pub fn search_text(&self) -> Option<&str> {
        let t = self.query_text.trim();
        if t.is_empty() {
            None
        } else {
            Some(t)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    InlineQuery(InlineQuery),
    /// Any other update kind; acknowledged but never forwarded.
    Ignored,
}

/// One record from the Bot API update stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub update_id: UpdateId,
    pub kind: UpdateKind,
}

impl Update {
    pub fn inline_query(&self) -> Option<&InlineQuery> {
        match &self.kind {
            UpdateKind::InlineQuery(q) => Some(q),
            UpdateKind::Ignored => None,
        }
    }
}

impl Positioned for Update {
    type Position = UpdateId;

    fn position(&self) -> &UpdateId {
        &self.update_id
    }

    fn is_deliverable(&self) -> bool {
        matches!(self.kind, UpdateKind::InlineQuery(_))
    }
}

/// A search hit used to build inline answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestionHit {
    pub question_id: u64,
    pub title: String,
    pub link: String,
}

use std::fmt;

use serde::Serialize;

/// Bot API `chat_id`: a numeric id or an `@channelusername`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl ChatTarget {
    /// Parse config input: numeric ids stay numeric, anything else is a username.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => ChatTarget::Id(id),
            Err(_) if raw.starts_with('@') => ChatTarget::Username(raw.to_string()),
            Err(_) => ChatTarget::Username(format!("@{raw}")),
        }
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{id}"),
            ChatTarget::Username(name) => f.write_str(name),
        }
    }
}

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{driver::PersistPolicy, errors::Error, messaging::types::ChatTarget, Result};

const DEFAULT_CHANNEL: &str = "@esperanto_se_demandoj";
const DEFAULT_SITE: &str = "esperanto";

/// Where the channel relay reads new questions from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelSource {
    /// Stack Exchange REST API, watermark is a Unix timestamp.
    Api,
    /// Site Atom feed, watermark is an RFC3339 timestamp.
    Feed,
}

/// Typed configuration, loaded once at startup and passed into the loops.
#[derive(Clone, Debug)]
pub struct Config {
    // State
    pub state_dir: PathBuf,
    pub api_key: String,

    // Endpoints
    pub telegram_api_base: String,
    pub stackexchange_api_base: String,
    pub site: String,
    pub feed_url: String,
    pub channel: ChatTarget,

    // Relay behaviour
    pub channel_source: ChannelSource,
    pub persist_policy: PersistPolicy,
    pub relay_page_size: u32,
    pub poll_interval: Duration,

    // Timing
    pub long_poll_timeout: Duration,
    pub http_timeout: Duration,
    pub fetch_backoff: Duration,
    pub forward_backoff: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let home = home_dir().ok_or_else(|| Error::Config("HOME is not set".to_string()))?;
        let state_dir = env_path("ESPERANTOSE_DIR").unwrap_or_else(|| home.join(".esperantose"));

        // The bot token is the one required input.
        let api_key = read_api_key(&state_dir.join("apikey"))?;

        let telegram_api_base = env_str("TELEGRAM_API_BASE")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://api.telegram.org".to_string());
        let stackexchange_api_base = env_str("STACKEXCHANGE_API_BASE")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://api.stackexchange.com/2.2".to_string());
        let site = env_str("ESPERANTOSE_SITE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_SITE.to_string());
        let feed_url = env_str("ESPERANTOSE_FEED_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| format!("https://{site}.stackexchange.com/feeds"));
        let channel = ChatTarget::parse(
            &env_str("ESPERANTOSE_CHANNEL")
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
        );

        let channel_source = match env_str("ESPERANTOSE_SOURCE").as_deref().map(str::trim) {
            None | Some("") | Some("api") => ChannelSource::Api,
            Some("feed") => ChannelSource::Feed,
            Some(other) => {
                return Err(Error::Config(format!(
                    "ESPERANTOSE_SOURCE must be `api` or `feed`, got `{other}`"
                )))
            }
        };
        let persist_policy = match env_str("ESPERANTOSE_PERSIST").as_deref().map(str::trim) {
            None | Some("") | Some("item") => PersistPolicy::PerItem,
            Some("batch") => PersistPolicy::PerBatch,
            Some(other) => {
                return Err(Error::Config(format!(
                    "ESPERANTOSE_PERSIST must be `item` or `batch`, got `{other}`"
                )))
            }
        };

        let relay_page_size = env_u32("ESPERANTOSE_PAGE_SIZE").unwrap_or(10).clamp(1, 100);
        let poll_interval =
            Duration::from_secs(env_u64("ESPERANTOSE_POLL_INTERVAL_SECS").unwrap_or(600));

        // getUpdates waits `long_poll_timeout + http_timeout` before giving up.
        let long_poll_timeout = Duration::from_secs(5 * 60);
        let http_timeout =
            Duration::from_secs(env_u64("ESPERANTOSE_HTTP_TIMEOUT_SECS").unwrap_or(30));

        Ok(Self {
            state_dir,
            api_key,
            telegram_api_base,
            stackexchange_api_base,
            site,
            feed_url,
            channel,
            channel_source,
            persist_policy,
            relay_page_size,
            poll_interval,
            long_poll_timeout,
            http_timeout,
            fetch_backoff: Duration::from_secs(60),
            forward_backoff: Duration::from_secs(30),
        })
    }

    pub fn update_id_file(&self) -> PathBuf {
        self.state_dir.join("update_id")
    }

    pub fn timestamp_file(&self) -> PathBuf {
        self.state_dir.join("timestamp")
    }

    pub fn published_file(&self) -> PathBuf {
        self.state_dir.join("published")
    }
}

/// Read the bot token: first line of the file, trailing whitespace stripped.
pub fn read_api_key(path: &Path) -> Result<String> {
    let txt = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read API key {}: {e}", path.display())))?;
    let key = txt.lines().next().unwrap_or("").trim_end().to_string();
    if key.trim().is_empty() {
        return Err(Error::Config(format!(
            "API key file {} is empty",
            path.display()
        )));
    }
    Ok(key)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

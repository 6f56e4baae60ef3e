use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COLOR: &str = "#0078D7";
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: i64 = 60;

/// One configured remote calendar feed plus its refresh policy and
/// freshness timestamp.
///
/// `last_updated` only advances on a confirmed successful network fetch,
/// never on a cache-fallback read. The raw `url` string (including a
/// `webcal://` scheme) is the cache key; scheme normalization happens only
/// at request time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    pub refresh_interval_minutes: i64,
    pub color: String,
    pub is_enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            url: String::new(),
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            color: DEFAULT_COLOR.to_string(),
            is_enabled: true,
            last_updated: None,
        }
    }
}

impl Source {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }

    /// When the next network refresh is due, or `None` when auto-refresh is
    /// disabled (`refresh_interval_minutes <= 0`) or no successful fetch has
    /// happened yet (due immediately).
    pub fn next_refresh_due(&self) -> Option<DateTime<Utc>> {
        if self.refresh_interval_minutes <= 0 {
            return None;
        }
        self.last_updated
            .map(|t| t + Duration::minutes(self.refresh_interval_minutes))
    }

    /// Whether the feed is still fresh at `now`, per its own interval.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.next_refresh_due() {
            Some(due) => now < due,
            None => false,
        }
    }
}

/// The reason a refresh cycle was initiated. Affects only the skip-network
/// decision, never parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Timer,
    ManualRefresh,
    EditSource,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "Startup",
            Trigger::Timer => "Timer",
            Trigger::ManualRefresh => "ManualRefresh",
            Trigger::EditSource => "EditSource",
        }
    }

    /// Whether a settings-persist failure should be surfaced to the caller.
    /// Only explicit user actions deserve synchronous feedback; background
    /// paths swallow it.
    pub fn surfaces_persist_errors(&self) -> bool {
        matches!(self, Trigger::ManualRefresh | Trigger::EditSource)
    }
}

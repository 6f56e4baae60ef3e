//! Per-source fetch with cache fallback.
//!
//! [`EventFetcher`] implements the fetch policy: decide whether the network
//! may be skipped, attempt the request, fall back to the on-disk cache, and
//! normalize the parsed entries into [`Event`]s stamped with the owning
//! source's identity. No failure here is fatal; the worst outcome is an
//! empty event list for one cycle.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::cache::{CacheStore, RequestLog};
use crate::domain::{Event, Source, Trigger};
use crate::parser::CalendarParser;

pub use http::HttpFetcher;

/// Byte-level transport seam, implemented by [`HttpFetcher`] in production
/// and by fakes in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Result of one fetch cycle. `fetched_at` is `Some` only when the bytes
/// came from a successful network retrieval; the caller applies it to the
/// source's `last_updated` and persists the change.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub events: Vec<Event>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// URL used for the actual request: `webcal://` feeds are served over HTTPS.
/// The raw URL remains the cache key.
pub fn request_url(url: &str) -> String {
    const SCHEME: &str = "webcal://";
    let has_webcal_scheme = url
        .get(..SCHEME.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SCHEME));
    if has_webcal_scheme {
        format!("https://{}", &url[SCHEME.len()..])
    } else {
        url.to_string()
    }
}

/// Skip-network policy, evaluated before any request:
/// 1. on `Startup` with auto-refresh disabled, only the cache is consulted;
/// 2. on `Startup` while the feed is still fresh, the network is skipped.
/// Every other trigger always goes to the network.
pub fn should_skip_network(source: &Source, trigger: Trigger, now: DateTime<Utc>) -> bool {
    if trigger != Trigger::Startup {
        return false;
    }
    if source.refresh_interval_minutes <= 0 {
        return true;
    }
    source.is_fresh(now)
}

pub struct EventFetcher {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<CacheStore>,
    parser: Arc<dyn CalendarParser>,
    request_log: Arc<RequestLog>,
}

impl EventFetcher {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<CacheStore>,
        parser: Arc<dyn CalendarParser>,
        request_log: Arc<RequestLog>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            parser,
            request_log,
        }
    }

    /// Fetch current events for one source, applying the skip-network
    /// policy and the cache fallback.
    pub async fn fetch(&self, source: &Source, trigger: Trigger) -> FetchOutcome {
        let url = &source.url;
        let now = Utc::now();

        let bytes = if should_skip_network(source, trigger, now) {
            self.request_log.record(trigger, url, "SkippedNetwork", None);
            tracing::debug!("Skipping network for {} ({})", source.display_name(), trigger.as_str());
            self.read_cache(trigger, url)
        } else {
            match self.fetcher.fetch_bytes(&request_url(url)).await {
                Ok(body) => {
                    self.request_log.record(trigger, url, "Success", None);
                    if let Err(e) = self.cache.write(url, &body) {
                        tracing::warn!("Failed to cache feed {}: {}", url, e);
                    }
                    return FetchOutcome {
                        events: self.parse(source, trigger, &body),
                        fetched_at: Some(Utc::now()),
                    };
                }
                Err(e) => {
                    self.request_log.record(trigger, url, "Failed", Some(&e.to_string()));
                    tracing::warn!("Fetch failed for {}: {}", source.display_name(), e);
                    self.read_cache(trigger, url)
                }
            }
        };

        let events = match bytes {
            Some(body) => self.parse(source, trigger, &body),
            None => Vec::new(),
        };

        FetchOutcome {
            events,
            fetched_at: None,
        }
    }

    fn read_cache(&self, trigger: Trigger, url: &str) -> Option<Vec<u8>> {
        match self.cache.read(url) {
            Some(bytes) => {
                self.request_log.record(trigger, url, "CacheHit", None);
                Some(bytes)
            }
            None => {
                self.request_log.record(trigger, url, "CacheMiss", None);
                None
            }
        }
    }

    fn parse(&self, source: &Source, trigger: Trigger, bytes: &[u8]) -> Vec<Event> {
        match self.parser.parse(bytes) {
            Ok(raw_events) => raw_events
                .into_iter()
                .map(|raw| Event::from_raw(raw, source))
                .collect(),
            Err(e) => {
                self.request_log
                    .record(trigger, &source.url, "ParseFailed", Some(&e.to_string()));
                tracing::warn!("Parse failed for {}: {}", source.display_name(), e);
                Vec::new()
            }
        }
    }
}

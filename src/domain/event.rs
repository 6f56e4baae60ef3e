use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::Source;

/// One parsed calendar entry as produced by a [`CalendarParser`]
/// implementation, before any source identity is stamped on it.
///
/// [`CalendarParser`]: crate::parser::CalendarParser
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    pub uid: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub is_all_day: bool,
}

/// A display-ready calendar event. Immutable once constructed; the whole
/// list for a source is regenerated on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub url: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub source_id: String,
    pub source_color: String,
}

impl Event {
    /// Build an event from a raw parsed entry, stamping the owning source's
    /// identity and color. A missing end time defaults to one hour after the
    /// start; a missing uid falls back to a deterministic digest.
    pub fn from_raw(raw: RawEvent, source: &Source) -> Self {
        let start_time = raw.start;
        let end_time = raw.end.unwrap_or(start_time + Duration::hours(1));
        let title = raw.title.unwrap_or_else(|| "(untitled)".to_string());
        let id = raw
            .uid
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| Self::generate_id(&source.url, &title, start_time));

        Self {
            id,
            title,
            description: raw.description.unwrap_or_default(),
            location: raw.location.unwrap_or_default(),
            url: raw.url.unwrap_or_default(),
            start_time,
            end_time,
            is_all_day: raw.is_all_day,
            source_id: source.id.clone(),
            source_color: source.color.clone(),
        }
    }

    /// Deterministic fallback id for entries without a UID.
    pub fn generate_id(source_url: &str, title: &str, start: DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_url.as_bytes());
        hasher.update(title.as_bytes());
        hasher.update(start.to_rfc3339().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The set of calendar dates an event occupies, ascending.
///
/// An all-day event spanning midnight-to-midnight must not bleed into the
/// following day's cell, so when `end > start` the effective end instant is
/// `end - 1s` before taking its date. A timed event that crosses midnight
/// with an end time-of-day of exactly 00:00:00 gets the same correction:
/// an exact-midnight end means "through the end of the previous day".
pub fn days_covered(event: &Event) -> Vec<NaiveDate> {
    let start_date = event.start_time.date_naive();
    let mut end_instant = event.end_time;

    if event.end_time > event.start_time {
        let ends_at_midnight = event.end_time.time() == NaiveTime::MIN;
        let crosses_midnight = event.end_time.date_naive() > start_date;
        if event.is_all_day || (ends_at_midnight && crosses_midnight) {
            end_instant -= Duration::seconds(1);
        }
    }

    let end_date = end_instant.date_naive().max(start_date);

    let mut days = Vec::new();
    let mut current = start_date;
    while current <= end_date {
        days.push(current);
        current += Duration::days(1);
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(start: DateTime<Utc>, end: DateTime<Utc>, is_all_day: bool) -> Event {
        let source = Source::new("s1", "https://example.com/cal.ics");
        Event::from_raw(
            RawEvent {
                start,
                end: Some(end),
                is_all_day,
                ..RawEvent::default()
            },
            &source,
        )
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_all_day_single_day_does_not_bleed() {
        let e = event(at(2026, 2, 11, 0, 0), at(2026, 2, 12, 0, 0), true);
        assert_eq!(days_covered(&e), vec![date(2026, 2, 11)]);
    }

    #[test]
    fn test_timed_ending_exactly_at_midnight() {
        let e = event(at(2026, 2, 11, 22, 0), at(2026, 2, 12, 0, 0), false);
        assert_eq!(days_covered(&e), vec![date(2026, 2, 11)]);
    }

    #[test]
    fn test_timed_same_day() {
        let e = event(at(2026, 2, 11, 10, 0), at(2026, 2, 11, 12, 0), false);
        assert_eq!(days_covered(&e), vec![date(2026, 2, 11)]);
    }

    #[test]
    fn test_all_day_spanning_three_days() {
        let e = event(at(2026, 2, 11, 0, 0), at(2026, 2, 14, 0, 0), true);
        assert_eq!(
            days_covered(&e),
            vec![date(2026, 2, 11), date(2026, 2, 12), date(2026, 2, 13)]
        );
    }

    #[test]
    fn test_timed_crossing_midnight_past_it() {
        let e = event(at(2026, 2, 11, 22, 0), at(2026, 2, 12, 1, 0), false);
        assert_eq!(days_covered(&e), vec![date(2026, 2, 11), date(2026, 2, 12)]);
    }

    #[test]
    fn test_zero_length_event_covers_start_date() {
        let e = event(at(2026, 2, 11, 9, 0), at(2026, 2, 11, 9, 0), false);
        assert_eq!(days_covered(&e), vec![date(2026, 2, 11)]);
    }

    #[test]
    fn test_from_raw_defaults() {
        let source = Source::new("s1", "https://example.com/cal.ics");
        let start = at(2026, 2, 11, 9, 0);
        let e = Event::from_raw(
            RawEvent {
                start,
                ..RawEvent::default()
            },
            &source,
        );
        assert_eq!(e.title, "(untitled)");
        assert_eq!(e.end_time, start + Duration::hours(1));
        assert_eq!(e.source_id, "s1");
        // fallback id is a sha256 hex digest
        assert_eq!(e.id.len(), 64);
        assert!(e.id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fallback_id_deterministic() {
        let id1 = Event::generate_id("https://example.com/cal.ics", "Standup", at(2026, 2, 11, 9, 0));
        let id2 = Event::generate_id("https://example.com/cal.ics", "Standup", at(2026, 2, 11, 9, 0));
        let id3 = Event::generate_id("https://example.com/cal.ics", "Standup", at(2026, 2, 12, 9, 0));
        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_uid_preserved_when_present() {
        let source = Source::new("s1", "https://example.com/cal.ics");
        let e = Event::from_raw(
            RawEvent {
                uid: Some("abc-123".into()),
                start: at(2026, 2, 11, 9, 0),
                ..RawEvent::default()
            },
            &source,
        );
        assert_eq!(e.id, "abc-123");
    }
}

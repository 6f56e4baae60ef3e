//! Calendar wire-format parsing boundary.
//!
//! The engine only depends on the [`CalendarParser`] trait; [`IcsParser`]
//! is the default implementation backed by the `ical` crate. Timezone
//! identifiers on DTSTART/DTEND are not resolved: values are read as naive
//! instants, which matches how the cached feeds are displayed.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ical::parser::ical::component::IcalEvent;

use crate::app::{AlmanacError, Result};
use crate::domain::RawEvent;

pub trait CalendarParser: Send + Sync {
    /// Parse raw feed bytes into raw events. A failure here is recoverable
    /// for the caller (the source yields no events this cycle).
    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawEvent>>;
}

#[derive(Debug, Clone, Default)]
pub struct IcsParser;

impl IcsParser {
    pub fn new() -> Self {
        Self
    }
}

impl CalendarParser for IcsParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawEvent>> {
        let mut events = Vec::new();

        for calendar in ical::IcalParser::new(bytes) {
            let calendar = calendar.map_err(|e| AlmanacError::Parse(e.to_string()))?;
            for component in &calendar.events {
                match raw_event_from(component) {
                    Some(raw) => events.push(raw),
                    None => tracing::debug!("Skipping VEVENT without a usable DTSTART"),
                }
            }
        }

        Ok(events)
    }
}

fn raw_event_from(component: &IcalEvent) -> Option<RawEvent> {
    let mut raw = RawEvent::default();
    let mut start = None;
    let mut end = None;

    for prop in &component.properties {
        let value = match prop.value.as_deref() {
            Some(v) if !v.is_empty() => v,
            _ => continue,
        };
        match prop.name.as_str() {
            "UID" => raw.uid = Some(value.to_string()),
            "SUMMARY" => raw.title = Some(unescape_text(value)),
            "DESCRIPTION" => raw.description = Some(unescape_text(value)),
            "LOCATION" => raw.location = Some(unescape_text(value)),
            "URL" => raw.url = Some(value.to_string()),
            "DTSTART" => {
                if let Some((instant, date_only)) = parse_ical_instant(value) {
                    start = Some(instant);
                    raw.is_all_day = date_only || has_date_value_param(prop);
                }
            }
            "DTEND" => {
                if let Some((instant, _)) = parse_ical_instant(value) {
                    end = Some(instant);
                }
            }
            _ => {}
        }
    }

    raw.start = start?;
    raw.end = end;
    Some(raw)
}

fn has_date_value_param(prop: &ical::property::Property) -> bool {
    prop.params
        .as_ref()
        .map(|params| {
            params
                .iter()
                .any(|(name, values)| name == "VALUE" && values.iter().any(|v| v == "DATE"))
        })
        .unwrap_or(false)
}

/// Parse an iCalendar DATE or DATE-TIME value. Returns the instant and
/// whether the value was date-only (all-day). UTC-suffixed and floating
/// forms are both read as naive instants.
fn parse_ical_instant(value: &str) -> Option<(DateTime<Utc>, bool)> {
    let value = value.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ") {
        return Some((dt.and_utc(), false));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Some((dt.and_utc(), false));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
        return Some((date.and_hms_opt(0, 0, 0)?.and_utc(), true));
    }
    None
}

/// Undo iCalendar TEXT escaping (RFC 5545 §3.3.11).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }
    out
}

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::event::{days_covered, Event};

/// Day classification derived from a holiday feed entry's title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolidayType {
    /// A day off.
    Holiday,
    /// A compensating workday (a weekend day swapped for a holiday).
    Workday,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayInfo {
    pub kind: HolidayType,
    pub description: String,
}

pub type HolidayMap = BTreeMap<NaiveDate, HolidayInfo>;

/// Title substrings that classify a feed entry as a holiday or a
/// compensating workday. Defaults match the public China holiday calendar.
#[derive(Debug, Clone)]
pub struct HolidayMarkers {
    pub holiday: Vec<String>,
    pub workday: Vec<String>,
}

impl Default for HolidayMarkers {
    fn default() -> Self {
        Self {
            holiday: vec!["假期".to_string()],
            workday: vec!["补班".to_string()],
        }
    }
}

impl HolidayMarkers {
    fn classify(&self, title: &str) -> Option<HolidayType> {
        if self.holiday.iter().any(|m| title.contains(m.as_str())) {
            Some(HolidayType::Holiday)
        } else if self.workday.iter().any(|m| title.contains(m.as_str())) {
            Some(HolidayType::Workday)
        } else {
            None
        }
    }
}

/// Expand holiday feed events into a day -> classification map, using the
/// same date-range normalization as event placement. Entries whose title
/// matches no marker are ignored. Later events win on overlapping days.
pub fn expand_holidays(events: &[Event], markers: &HolidayMarkers) -> HolidayMap {
    let mut map = HolidayMap::new();

    for event in events {
        let Some(kind) = markers.classify(&event.title) else {
            continue;
        };
        let description = if event.description.is_empty() {
            event.title.clone()
        } else {
            format!("{}\n{}", event.title, event.description)
        };
        for day in days_covered(event) {
            map.insert(
                day,
                HolidayInfo {
                    kind,
                    description: description.clone(),
                },
            );
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RawEvent, Source};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn holiday_event(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        let source = Source::new("holidays", "https://example.com/holidays.ics");
        Event::from_raw(
            RawEvent {
                title: Some(title.to_string()),
                start,
                end: Some(end),
                is_all_day: true,
                ..RawEvent::default()
            },
            &source,
        )
    }

    #[test]
    fn test_expands_multi_day_holiday() {
        let events = vec![holiday_event("春节 假期", at(2026, 2, 16), at(2026, 2, 19))];
        let map = expand_holidays(&events, &HolidayMarkers::default());

        assert_eq!(map.len(), 3);
        for day in [16, 17, 18] {
            let info = &map[&NaiveDate::from_ymd_opt(2026, 2, day).unwrap()];
            assert_eq!(info.kind, HolidayType::Holiday);
        }
    }

    #[test]
    fn test_classifies_workday() {
        let events = vec![holiday_event("春节 补班", at(2026, 2, 14), at(2026, 2, 15))];
        let map = expand_holidays(&events, &HolidayMarkers::default());

        let info = &map[&NaiveDate::from_ymd_opt(2026, 2, 14).unwrap()];
        assert_eq!(info.kind, HolidayType::Workday);
    }

    #[test]
    fn test_ignores_unmarked_titles() {
        let events = vec![holiday_event("Some meeting", at(2026, 2, 14), at(2026, 2, 15))];
        let map = expand_holidays(&events, &HolidayMarkers::default());
        assert!(map.is_empty());
    }

    #[test]
    fn test_custom_markers() {
        let markers = HolidayMarkers {
            holiday: vec!["Holiday".into()],
            workday: vec!["Makeup".into()],
        };
        let events = vec![
            holiday_event("National Holiday", at(2026, 7, 4), at(2026, 7, 5)),
            holiday_event("Makeup day", at(2026, 7, 6), at(2026, 7, 7)),
        ];
        let map = expand_holidays(&events, &markers);
        assert_eq!(
            map[&NaiveDate::from_ymd_opt(2026, 7, 4).unwrap()].kind,
            HolidayType::Holiday
        );
        assert_eq!(
            map[&NaiveDate::from_ymd_opt(2026, 7, 6).unwrap()].kind,
            HolidayType::Workday
        );
    }
}

pub mod event;
pub mod holiday;
pub mod source;

pub use event::{days_covered, Event, RawEvent};
pub use holiday::{expand_holidays, HolidayInfo, HolidayMap, HolidayMarkers, HolidayType};
pub use source::{Source, Trigger};

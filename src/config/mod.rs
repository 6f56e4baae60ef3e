//! Settings persistence.
//!
//! Settings are read from `~/.config/almanac/settings.toml` at startup. If
//! the file doesn't exist, a commented default is created. The engine
//! persists `last_updated` mutations back through [`SettingsStore`] after
//! each successful fetch.

use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::app::{AlmanacError, Result};
use crate::domain::{HolidayMarkers, Source};

/// Fixed id of the synthetic holiday feed. It participates in scheduling
/// like any configured source but is never written to the settings file.
pub const HOLIDAY_SOURCE_ID: &str = "system:holidays";

const DEFAULT_HOLIDAY_URL: &str =
    "https://cdn.jsdelivr.net/gh/lanceliao/china-holiday-calender/holidayCal.ics";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auto_start: bool,
    pub theme: String,
    pub show_holiday_feed: bool,
    pub holiday: HolidayFeedSettings,
    pub sources: Vec<Source>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_start: false,
            theme: "Auto".to_string(),
            show_holiday_feed: true,
            holiday: HolidayFeedSettings::default(),
            sources: Vec::new(),
        }
    }
}

impl Settings {
    pub fn enabled_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(|s| s.is_enabled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidayFeedSettings {
    pub url: String,
    pub refresh_interval_minutes: i64,
    pub holiday_markers: Vec<String>,
    pub workday_markers: Vec<String>,
}

impl Default for HolidayFeedSettings {
    fn default() -> Self {
        let markers = HolidayMarkers::default();
        Self {
            url: DEFAULT_HOLIDAY_URL.to_string(),
            refresh_interval_minutes: 1440,
            holiday_markers: markers.holiday,
            workday_markers: markers.workday,
        }
    }
}

impl HolidayFeedSettings {
    pub fn markers(&self) -> HolidayMarkers {
        HolidayMarkers {
            holiday: self.holiday_markers.clone(),
            workday: self.workday_markers.clone(),
        }
    }

    /// The synthetic source fed into the same scheduler/fetcher mechanism
    /// as user-configured feeds.
    pub fn to_source(&self) -> Source {
        let mut source = Source::new(HOLIDAY_SOURCE_ID, self.url.clone());
        source.name = "Holidays".to_string();
        source.refresh_interval_minutes = self.refresh_interval_minutes;
        source
    }
}

pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Open the store at the default path, creating a commented default
    /// file on first run.
    pub fn load() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let settings = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)
                .map_err(|e| AlmanacError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Self::create_default(&path)?;
            Settings::default()
        };

        Ok(Self {
            path,
            current: RwLock::new(settings),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AlmanacError::Config("Could not determine config directory".into()))?;
        Ok(config_dir.join("almanac").join("settings.toml"))
    }

    pub fn get(&self) -> Settings {
        self.current.read().expect("settings lock poisoned").clone()
    }

    pub fn get_sources(&self) -> Vec<Source> {
        self.get().sources
    }

    /// Persist a full settings value. Failures map to `ConfigPersist`,
    /// which only explicit user actions surface.
    pub fn save(&self, settings: Settings) -> Result<()> {
        let content = toml::to_string_pretty(&settings)
            .map_err(|e| AlmanacError::ConfigPersist(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| AlmanacError::ConfigPersist(e.to_string()))?;
        *self.current.write().expect("settings lock poisoned") = settings;
        Ok(())
    }

    /// Persist an updated source list, leaving the global flags untouched.
    pub fn save_sources(&self, sources: Vec<Source>) -> Result<()> {
        let mut settings = self.get();
        settings.sources = sources;
        self.save(settings)
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::default_content())?;
        Ok(())
    }

    fn default_content() -> String {
        format!(
            r##"# Almanac settings
#
# Each [[sources]] block is one remote iCalendar feed. A source with
# refresh_interval_minutes = 0 is never auto-refreshed: it is read from
# the local cache at startup and only updated on manual refresh.
#
# webcal:// URLs are fetched over https.

auto_start = false
theme = "Auto"
show_holiday_feed = true

# [[sources]]
# id = "team"
# name = "Team calendar"
# url = "webcal://example.com/team.ics"
# refresh_interval_minutes = 60
# color = "#0078D7"
# is_enabled = true

[holiday]
url = "{DEFAULT_HOLIDAY_URL}"
refresh_interval_minutes = 1440
holiday_markers = ["假期"]
workday_markers = ["补班"]
"##
        )
    }
}

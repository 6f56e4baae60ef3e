pub mod error;

pub use error::{AlmanacError, Result};

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheStore, RequestLog};
use crate::config::SettingsStore;
use crate::engine::SyncEngine;
use crate::fetcher::{EventFetcher, HttpFetcher};
use crate::parser::IcsParser;

/// Wires the settings store, byte cache, fetcher, parser, and sync engine
/// together.
pub struct AppContext {
    pub settings: Arc<SettingsStore>,
    pub cache: Arc<CacheStore>,
    pub engine: Arc<SyncEngine>,
}

impl AppContext {
    pub fn new(settings_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let settings = Arc::new(match settings_path {
            Some(path) => SettingsStore::open(path)?,
            None => SettingsStore::load()?,
        });

        let data_dir = match data_dir {
            Some(dir) => dir,
            None => Self::default_data_dir()?,
        };
        fs::create_dir_all(&data_dir)?;

        let cache = Arc::new(CacheStore::new(data_dir.join("cache"))?);
        let request_log = Arc::new(RequestLog::new(&data_dir));
        let fetcher = Arc::new(EventFetcher::new(
            Arc::new(HttpFetcher::new()),
            cache.clone(),
            Arc::new(IcsParser::new()),
            request_log,
        ));
        let engine = SyncEngine::new(settings.clone(), fetcher, cache.clone());

        Ok(Self {
            settings,
            cache,
            engine,
        })
    }

    fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| AlmanacError::Config("Could not find data directory".into()))?;
        Ok(data_dir.join("almanac"))
    }
}

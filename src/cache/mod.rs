//! On-disk byte cache for fetched feeds plus the append-only request log.
//!
//! Each source caches the raw response body under a file named by the hex
//! sha256 of its raw URL string, so cache entries survive restarts and
//! renames of the source. The file's modification time doubles as the
//! "last successfully cached" timestamp used to seed a source's
//! `last_updated` across process restarts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::domain::Trigger;

const CACHE_SUFFIX: &str = ".ics";
const REQUEST_LOG_FILE: &str = "requests.log";

pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open (and create if needed) a cache directory.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic cache file path for a source URL. Keyed by the raw URL
    /// string, not the scheme-normalized request URL.
    pub fn path(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let name = format!("{}{}", hex::encode(hasher.finalize()), CACHE_SUFFIX);
        self.root.join(name)
    }

    /// Modification time of the cache file, or `None` if it does not exist
    /// or its metadata is unreadable.
    pub fn last_modified(&self, url: &str) -> Option<DateTime<Utc>> {
        let meta = fs::metadata(self.path(url)).ok()?;
        let mtime = meta.modified().ok()?;
        Some(DateTime::<Utc>::from(mtime))
    }

    /// Cached bytes for the URL, or `None` if missing or unreadable. Read
    /// failures are never escalated; the cache is strictly best-effort.
    pub fn read(&self, url: &str) -> Option<Vec<u8>> {
        match fs::read(self.path(url)) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::debug!("Cache read failed for {}: {}", url, e);
                None
            }
        }
    }

    /// Atomically overwrite the cache entry: write to a uniquely named temp
    /// file in the same directory, then rename over the target. Overlapping
    /// writers of the same URL each rename a complete file; the last rename
    /// wins.
    pub fn write(&self, url: &str, bytes: &[u8]) -> std::io::Result<()> {
        let target = self.path(url);
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(target)?;
        Ok(())
    }
}

/// Append-only diagnostics log of every fetch attempt. Write-only: the
/// engine never reads it back, and logging failures are ignored.
pub struct RequestLog {
    path: PathBuf,
}

impl RequestLog {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(REQUEST_LOG_FILE),
        }
    }

    pub fn record(&self, trigger: Trigger, url: &str, status: &str, error: Option<&str>) {
        let line = format!(
            "[{}] Trigger: {} | URL: {} | Status: {} | Error: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            trigger.as_str(),
            url,
            status,
            error.unwrap_or("None"),
        );
        // Diagnostics only; never let logging interfere with a refresh.
        let _ = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_path_is_stable_and_suffixed() {
        let (_dir, store) = store();
        let p1 = store.path("webcal://example.com/cal.ics");
        let p2 = store.path("webcal://example.com/cal.ics");
        assert_eq!(p1, p2);
        assert!(p1.to_string_lossy().ends_with(".ics"));
    }

    #[test]
    fn test_path_differs_per_url() {
        let (_dir, store) = store();
        assert_ne!(
            store.path("https://example.com/a.ics"),
            store.path("https://example.com/b.ics")
        );
    }

    #[test]
    fn test_raw_url_is_the_cache_key() {
        // webcal:// and https:// forms of the same feed are distinct keys;
        // normalization happens at request time only.
        let (_dir, store) = store();
        assert_ne!(
            store.path("webcal://example.com/a.ics"),
            store.path("https://example.com/a.ics")
        );
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, store) = store();
        let url = "https://example.com/a.ics";
        store.write(url, b"BEGIN:VCALENDAR").unwrap();
        assert_eq!(store.read(url).unwrap(), b"BEGIN:VCALENDAR");
    }

    #[test]
    fn test_write_overwrites() {
        let (_dir, store) = store();
        let url = "https://example.com/a.ics";
        store.write(url, b"old").unwrap();
        store.write(url, b"new").unwrap();
        assert_eq!(store.read(url).unwrap(), b"new");
    }

    #[test]
    fn test_overlapping_writes_never_interleave() {
        let (_dir, store) = store();
        let url = "https://example.com/a.ics";
        let x = vec![b'x'; 4096];
        let y = vec![b'y'; 4096];

        std::thread::scope(|scope| {
            for payload in [&x, &y] {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..20 {
                        store.write(url, payload).unwrap();
                    }
                });
            }
        });

        // Whichever rename landed last, the file is one complete payload.
        let bytes = store.read(url).unwrap();
        assert!(bytes == x || bytes == y);
    }

    #[test]
    fn test_read_missing_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.read("https://example.com/missing.ics"), None);
    }

    #[test]
    fn test_last_modified_absent_then_present() {
        let (_dir, store) = store();
        let url = "https://example.com/a.ics";
        assert!(store.last_modified(url).is_none());

        let before = Utc::now() - chrono::Duration::seconds(5);
        store.write(url, b"data").unwrap();
        let mtime = store.last_modified(url).unwrap();
        assert!(mtime >= before);
    }

    #[test]
    fn test_request_log_appends() {
        let dir = TempDir::new().unwrap();
        let log = RequestLog::new(dir.path());
        log.record(Trigger::Timer, "https://example.com/a.ics", "Success", None);
        log.record(
            Trigger::Startup,
            "https://example.com/a.ics",
            "Failed",
            Some("timeout"),
        );

        let content = fs::read_to_string(dir.path().join("requests.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Trigger: Timer"));
        assert!(lines[0].contains("Status: Success"));
        assert!(lines[1].contains("Error: timeout"));
    }
}

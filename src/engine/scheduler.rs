//! Per-source refresh timing.
//!
//! Each armed source runs one explicit loop task: sleep until due, fire a
//! `Timer` refresh, recompute from the (possibly unchanged) `last_updated`,
//! repeat. The delay math lives in [`next_delay`] so it stays testable.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// Floor for a past-due arm. Firing instantly would cause a start-up
/// thundering herd and tight re-fire loops when `last_updated` cannot
/// advance.
pub const MIN_FIRE_DELAY: Duration = Duration::from_secs(1);

/// Floor applied after a fire that did not advance `last_updated` (network
/// down, persistent fetch failure). Without it the recomputed delay stays
/// past-due forever and the timer would re-fire every second.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(3600);

/// Delay until the next fire for a source, or `None` when auto-refresh is
/// disabled (`interval_minutes <= 0`).
pub fn next_delay(
    last_updated: Option<DateTime<Utc>>,
    interval_minutes: i64,
    now: DateTime<Utc>,
    after_stall: bool,
) -> Option<Duration> {
    if interval_minutes <= 0 {
        return None;
    }

    let delay = match last_updated {
        None => MIN_FIRE_DELAY,
        Some(last) => {
            let due = last + chrono::Duration::minutes(interval_minutes);
            match (due - now).to_std() {
                Ok(remaining) => remaining.max(MIN_FIRE_DELAY),
                // Due time already in the past.
                Err(_) => MIN_FIRE_DELAY,
            }
        }
    };

    if after_stall {
        Some(delay.max(RETRY_BACKOFF))
    } else {
        Some(delay)
    }
}

/// Registry of the per-source timer tasks. Arming a source replaces any
/// existing task for its id; disarming aborts it.
#[derive(Default)]
pub struct RefreshScheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source_id: &str, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        if let Some(existing) = tasks.insert(source_id.to_string(), handle) {
            existing.abort();
        }
    }

    /// Cancel and remove the timer for a source; idempotent.
    pub fn disarm(&self, source_id: &str) {
        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        if let Some(handle) = tasks.remove(source_id) {
            handle.abort();
        }
    }

    pub fn disarm_all(&self) {
        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }

    pub fn is_armed(&self, source_id: &str) -> bool {
        self.tasks
            .lock()
            .expect("scheduler lock poisoned")
            .contains_key(source_id)
    }

    pub fn armed_count(&self) -> usize {
        self.tasks.lock().expect("scheduler lock poisoned").len()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        for (_, handle) in self
            .tasks
            .lock()
            .expect("scheduler lock poisoned")
            .drain()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 11, h, m, 0).unwrap()
    }

    #[test]
    fn test_disabled_interval_never_fires() {
        assert_eq!(next_delay(Some(at(10, 0)), 0, at(12, 0), false), None);
        assert_eq!(next_delay(None, -5, at(12, 0), false), None);
    }

    #[test]
    fn test_fresh_source_waits_out_the_interval() {
        // Fetched at 12:00 with a 60 minute interval: at 12:10 the next
        // fire is 50 minutes away.
        let delay = next_delay(Some(at(12, 0)), 60, at(12, 10), false).unwrap();
        assert_eq!(delay, Duration::from_secs(50 * 60));
    }

    #[test]
    fn test_post_success_delay_is_at_least_the_interval() {
        // Right after a successful fetch the computed delay is the full
        // interval (minus scheduling epsilon, zero here).
        let delay = next_delay(Some(at(12, 0)), 60, at(12, 0), false).unwrap();
        assert!(delay >= Duration::from_secs(60 * 60));
    }

    #[test]
    fn test_past_due_floors_to_short_delay() {
        let delay = next_delay(Some(at(8, 0)), 60, at(12, 0), false).unwrap();
        assert_eq!(delay, MIN_FIRE_DELAY);
    }

    #[test]
    fn test_never_fetched_fires_soon() {
        let delay = next_delay(None, 60, at(12, 0), false).unwrap();
        assert_eq!(delay, MIN_FIRE_DELAY);
    }

    #[test]
    fn test_stalled_source_backs_off() {
        // last_updated did not advance on the previous fire: the past-due
        // recomputation must not re-fire every second.
        let delay = next_delay(Some(at(8, 0)), 60, at(12, 0), true).unwrap();
        assert_eq!(delay, RETRY_BACKOFF);
    }

    #[test]
    fn test_stall_backoff_does_not_shorten_long_delays() {
        // A 1-day interval source that stalled still waits its full
        // remaining time, not just the backoff floor.
        let delay = next_delay(Some(at(10, 0)), 1440, at(12, 0), true).unwrap();
        assert_eq!(delay, Duration::from_secs(22 * 3600));
    }

    #[tokio::test]
    async fn test_register_replaces_and_disarm_is_idempotent() {
        let scheduler = RefreshScheduler::new();

        scheduler.register("a", tokio::spawn(std::future::pending::<()>()));
        scheduler.register("a", tokio::spawn(std::future::pending::<()>()));
        assert_eq!(scheduler.armed_count(), 1);

        scheduler.disarm("a");
        assert!(!scheduler.is_armed("a"));
        scheduler.disarm("a");
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_disarm_all() {
        let scheduler = RefreshScheduler::new();
        scheduler.register("a", tokio::spawn(std::future::pending::<()>()));
        scheduler.register("b", tokio::spawn(std::future::pending::<()>()));
        scheduler.disarm_all();
        assert_eq!(scheduler.armed_count(), 0);
    }
}

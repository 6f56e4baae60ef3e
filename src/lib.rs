//! # Almanac
//!
//! A synchronization engine for remote iCalendar feeds: each configured
//! source is fetched on its own adaptive timer, cached on disk for
//! offline/failure resilience, and merged into a consistent per-source
//! event map for a display layer to consume.
//!
//! ## Architecture
//!
//! ```text
//! SyncEngine → EventFetcher → CacheStore (fallback/write)
//!      ↓             ↓
//! EventCache ← CalendarParser
//!      ↓
//! display collaborator (watch channels / snapshot)
//! ```
//!
//! - [`fetcher`]: network fetch with skip-network policy and cache fallback
//! - [`cache`]: per-URL byte cache plus the append-only request log
//! - [`parser`]: iCalendar parsing boundary
//! - [`engine`]: event cache, per-source refresh timers, sync coordination
//!
//! No failure in the engine is fatal: a source that cannot be fetched or
//! parsed simply shows no events until its next successful refresh.

/// Application context and error handling.
pub mod app;

/// Per-URL on-disk byte cache and fetch diagnostics log.
pub mod cache;

/// Command-line interface using clap.
pub mod cli;

/// Settings model and TOML-backed persistence.
pub mod config;

/// Core domain models.
///
/// - [`Source`](domain::Source): one feed plus its refresh policy
/// - [`Event`](domain::Event): a display-ready calendar entry
/// - [`days_covered`](domain::days_covered): shared date-range normalization
/// - [`expand_holidays`](domain::expand_holidays): holiday feed expansion
pub mod domain;

/// The sync engine: event cache, refresh scheduler, coordinator.
pub mod engine;

/// HTTP fetching and the per-source fetch/fallback policy.
pub mod fetcher;

/// Calendar wire-format parsing boundary.
pub mod parser;

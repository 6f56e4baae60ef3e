use sha2::{Digest, Sha256};
use url::Url;

use crate::app::{AlmanacError, AppContext, Result};
use crate::config::HOLIDAY_SOURCE_ID;
use crate::domain::{Source, Trigger};
use crate::fetcher::request_url;

pub async fn add_source(
    ctx: &AppContext,
    url: &str,
    name: Option<String>,
    id: Option<String>,
    interval: i64,
    color: Option<String>,
) -> Result<()> {
    // Validated after the webcal rewrite, so webcal:// feeds pass too.
    Url::parse(&request_url(url))?;

    if ctx.settings.get_sources().iter().any(|s| s.url == url) {
        println!("Source already exists: {}", url);
        return Ok(());
    }

    let id = id.unwrap_or_else(|| derive_id(url));
    let mut source = Source::new(id.clone(), url);
    source.name = name.unwrap_or_default();
    source.refresh_interval_minutes = interval;
    if let Some(color) = color {
        source.color = color;
    }

    ctx.engine.upsert_source(source).await?;
    ctx.engine.shutdown();

    let fetched = ctx.engine.snapshot().get(&id).map_or(0, |events| events.len());
    println!("Added source {} ({} events)", id, fetched);
    Ok(())
}

pub async fn remove_source(ctx: &AppContext, id: &str) -> Result<()> {
    require_source(ctx, id)?;
    ctx.engine.delete_source(id).await?;
    println!("Removed source: {}", id);
    Ok(())
}

pub async fn enable_source(ctx: &AppContext, id: &str) -> Result<()> {
    let mut source = require_source(ctx, id)?;
    source.is_enabled = true;
    ctx.engine.upsert_source(source).await?;
    ctx.engine.shutdown();
    println!("Enabled source: {}", id);
    Ok(())
}

pub async fn disable_source(ctx: &AppContext, id: &str) -> Result<()> {
    require_source(ctx, id)?;
    ctx.engine.disable_source(id).await?;
    println!("Disabled source: {}", id);
    Ok(())
}

pub fn list_sources(ctx: &AppContext) -> Result<()> {
    let sources = ctx.settings.get_sources();
    if sources.is_empty() {
        println!("No sources configured");
        return Ok(());
    }

    for source in sources {
        let state = if source.is_enabled { "enabled" } else { "disabled" };
        let freshness = match source.last_updated {
            Some(t) => format!("last updated {}", t.format("%Y-%m-%d %H:%M")),
            None => "never fetched".to_string(),
        };
        let interval = if source.refresh_interval_minutes > 0 {
            format!("every {}m", source.refresh_interval_minutes)
        } else {
            "manual only".to_string()
        };
        println!(
            "  {} [{}] {} ({}, {})",
            source.id,
            state,
            source.display_name(),
            interval,
            freshness
        );
    }
    Ok(())
}

pub async fn sync_once(ctx: &AppContext) -> Result<()> {
    let sources = ctx.settings.get().enabled_sources().count();
    if sources == 0 && !ctx.settings.get().show_holiday_feed {
        println!("No enabled sources to sync");
        return Ok(());
    }

    println!("Refreshing {} sources...", sources);
    let results = ctx.engine.refresh_all(Trigger::ManualRefresh).await?;

    let mut ids: Vec<&String> = results.keys().collect();
    ids.sort();
    for id in ids {
        println!("  {}: {} events", id, results[id].len());
    }

    if ctx.settings.get().show_holiday_feed {
        ctx.engine
            .refresh_one(HOLIDAY_SOURCE_ID, Trigger::ManualRefresh)
            .await?;
        let holidays = ctx.engine.subscribe_holidays().borrow().clone();
        println!("  holidays: {} marked days", holidays.len());
    }

    Ok(())
}

pub async fn run(ctx: &AppContext) -> Result<()> {
    let snapshot = ctx.engine.start().await?;
    tracing::info!(
        "Sync engine started: {} sources, {} with events",
        ctx.engine.sources().len(),
        snapshot.len()
    );

    let mut events_rx = ctx.engine.subscribe_events();
    let mut holidays_rx = ctx.engine.subscribe_holidays();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = events_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = events_rx.borrow_and_update().clone();
                let total: usize = snapshot.values().map(|v| v.len()).sum();
                tracing::info!("Events updated: {} events across {} sources", total, snapshot.len());
            }
            changed = holidays_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let map = holidays_rx.borrow_and_update().clone();
                tracing::info!("Holiday data updated: {} marked days", map.len());
            }
        }
    }

    tracing::info!("Shutting down");
    ctx.engine.shutdown();
    Ok(())
}

fn require_source(ctx: &AppContext, id: &str) -> Result<Source> {
    ctx.settings
        .get_sources()
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| AlmanacError::SourceNotFound(id.to_string()))
}

/// Short stable id derived from the URL, for when the user doesn't pick one.
fn derive_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_id_is_stable_and_short() {
        let a = derive_id("https://example.com/a.ics");
        let b = derive_id("https://example.com/a.ics");
        let c = derive_id("https://example.com/c.ics");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
    }
}

//! Periodic harvest scheduling.
//!
//! A single in-process loop: every tick, compute which active sources are
//! due from their frequency and last job start, then run them one after
//! another. Runs never overlap because dispatch is sequential within the
//! tick. A failing run is logged and does not stop the loop.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::harvest::run_harvest;
use crate::models::{Frequency, HarvestSource};
use crate::notify::Notifier;
use crate::registry::BackendRegistry;
use crate::store::Store;

/// When the next run of a source is due, given when its last job started.
/// `None` means the source only runs on demand. A source that has never
/// run is due immediately.
pub fn next_due(
    frequency: Frequency,
    last_started: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let interval = match frequency {
        Frequency::Manual => return None,
        Frequency::Daily => Duration::days(1),
        Frequency::Weekly => Duration::weeks(1),
        // Calendar months vary; a fixed 30 days keeps the math simple and
        // the drift irrelevant at this cadence.
        Frequency::Monthly => Duration::days(30),
    };
    match last_started {
        Some(started) => Some(started + interval),
        None => Some(now),
    }
}

/// Active sources whose next run is due at `now`, in slug order.
pub async fn due_sources(store: &Store, now: DateTime<Utc>) -> Result<Vec<HarvestSource>> {
    let mut due = Vec::new();
    for source in store.list_sources().await? {
        if !source.active {
            continue;
        }
        let last_started = store
            .last_job(&source.id)
            .await?
            .and_then(|job| job.started_at);
        if matches!(next_due(source.frequency, last_started, now), Some(at) if at <= now) {
            due.push(source);
        }
    }
    Ok(due)
}

/// Run the scheduling loop until the process is stopped.
pub async fn run_scheduler(
    config: &Config,
    store: &Store,
    registry: &BackendRegistry,
    notifier: &Notifier,
    fetcher: Arc<dyn Fetcher>,
) -> Result<()> {
    let mut ticker =
        tokio::time::interval(std::time::Duration::from_secs(config.schedule.tick_secs));
    tracing::info!(tick_secs = config.schedule.tick_secs, "scheduler started");

    loop {
        ticker.tick().await;
        let due = due_sources(store, Utc::now()).await?;
        if due.is_empty() {
            continue;
        }
        tracing::info!(due = due.len(), "dispatching due sources");
        for source in due {
            if let Err(err) =
                run_harvest(store, registry, notifier, Arc::clone(&fetcher), &source.slug, false)
                    .await
            {
                tracing::error!(
                    source = source.slug.as_str(),
                    error = %err,
                    "scheduled harvest failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_sources_are_never_due() {
        assert_eq!(next_due(Frequency::Manual, None, Utc::now()), None);
        assert_eq!(
            next_due(Frequency::Manual, Some(Utc::now()), Utc::now()),
            None
        );
    }

    #[test]
    fn never_run_sources_are_due_immediately() {
        let now = Utc::now();
        assert_eq!(next_due(Frequency::Daily, None, now), Some(now));
    }

    #[test]
    fn daily_runs_one_day_after_the_last_start() {
        let now = Utc::now();
        let last = now - Duration::hours(30);
        let due = next_due(Frequency::Daily, Some(last), now).unwrap();
        assert_eq!(due, last + Duration::days(1));
        assert!(due <= now);
    }

    #[test]
    fn weekly_is_not_due_after_one_day() {
        let now = Utc::now();
        let last = now - Duration::days(1);
        let due = next_due(Frequency::Weekly, Some(last), now).unwrap();
        assert!(due > now);
    }

    #[test]
    fn monthly_uses_a_thirty_day_interval() {
        let now = Utc::now();
        let last = now - Duration::days(31);
        let due = next_due(Frequency::Monthly, Some(last), now).unwrap();
        assert!(due <= now);
    }
}

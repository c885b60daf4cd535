//! Human-readable status reports for the CLI.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::error::BackendError;
use crate::models::HarvestJob;
use crate::registry::BackendRegistry;
use crate::store::Store;

fn when(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn job_summary(job: &HarvestJob) -> String {
    let failed = job.items.iter().filter(|i| !i.errors.is_empty()).count();
    format!(
        "{} ({} items, {} failed) at {}",
        job.status.as_str(),
        job.items.len(),
        failed,
        when(job.started_at),
    )
}

/// Overview of sources, registered backends, and the dataset count.
pub async fn print_status(store: &Store, registry: &BackendRegistry) -> Result<()> {
    let sources = store.list_sources().await?;
    println!("Sources ({}):", sources.len());
    for source in &sources {
        let state = if source.active { "active" } else { "inactive" };
        println!(
            "  {:<20} {:<8} {:<8} {:<9} {}",
            source.slug,
            source.backend,
            state,
            source.frequency.as_str(),
            source.url
        );
        match store.last_job(&source.id).await? {
            Some(job) => println!("  {:<20} last run: {}", "", job_summary(&job)),
            None => println!("  {:<20} last run: never", ""),
        }
    }

    println!();
    println!("Backends ({}):", registry.len());
    for factory in registry.factories() {
        println!("  {:<8} {}", factory.name(), factory.description());
    }

    println!();
    println!("Datasets: {}", store.count_datasets().await?);
    Ok(())
}

/// List configured sources, one line each.
pub async fn print_sources(store: &Store) -> Result<()> {
    let sources = store.list_sources().await?;
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }
    for source in &sources {
        let state = if source.active { "active" } else { "inactive" };
        println!(
            "{:<20} {:<8} {:<8} {:<9} {}",
            source.slug,
            source.backend,
            state,
            source.frequency.as_str(),
            source.url
        );
    }
    Ok(())
}

/// Recent jobs of one source, newest first, with per-item errors.
pub async fn print_jobs(store: &Store, slug: &str, limit: i64) -> Result<()> {
    let source = store
        .source_by_slug(slug)
        .await?
        .ok_or_else(|| BackendError::SourceNotFound(slug.to_string()))?;

    let jobs = store.jobs_for_source(&source.id, limit).await?;
    if jobs.is_empty() {
        println!("No jobs recorded for '{slug}'.");
        return Ok(());
    }

    for job in &jobs {
        println!("{}  {}", job.id, job_summary(job));
        for error in &job.errors {
            println!("    [{}] {}", error.stage.as_str(), error.message);
        }
        for item in &job.items {
            for error in &item.errors {
                println!(
                    "    {} [{}] {}",
                    item.remote_id,
                    error.stage.as_str(),
                    error.message
                );
            }
        }
    }
    Ok(())
}

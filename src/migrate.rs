use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::store::Store;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let store = Store::connect(config).await?;
    apply(store.pool()).await?;
    store.close().await;
    Ok(())
}

/// Apply the schema to an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Configured harvest sources
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_sources (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            backend TEXT NOT NULL,
            config_json TEXT NOT NULL DEFAULT '{}',
            frequency TEXT NOT NULL DEFAULT 'manual',
            active INTEGER NOT NULL DEFAULT 1,
            owner TEXT,
            organization TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per harvest run; terminal rows are never updated again
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_jobs (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            started_at INTEGER,
            ended_at INTEGER,
            FOREIGN KEY (source_id) REFERENCES harvest_sources(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Items are an append-only arena per job, addressed by (job_id, position)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_items (
            job_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            remote_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at INTEGER,
            ended_at INTEGER,
            dataset_id TEXT,
            PRIMARY KEY (job_id, position),
            FOREIGN KEY (job_id) REFERENCES harvest_jobs(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only error records; item_position NULL means job-level
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_errors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            item_position INTEGER,
            stage TEXT NOT NULL,
            message TEXT NOT NULL,
            details TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (job_id) REFERENCES harvest_jobs(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Reconciliation targets; extras_json carries the harvest:* provenance
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            tags_json TEXT NOT NULL DEFAULT '[]',
            license TEXT,
            landing_page TEXT,
            resources_json TEXT NOT NULL DEFAULT '[]',
            owner TEXT,
            organization TEXT,
            extras_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_source ON harvest_jobs(source_id, created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_errors_job ON harvest_errors(job_id)")
        .execute(pool)
        .await?;
    // Provenance lookup: the only query path the reconciliation engine uses
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_datasets_provenance
        ON datasets(
            json_extract(extras_json, '$."harvest:remote_id"'),
            json_extract(extras_json, '$."harvest:domain"')
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

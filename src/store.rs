//! SQLite-backed persistence for sources, jobs, items, errors, and datasets.
//!
//! Wraps a [`SqlitePool`] and translates every operation into one or more
//! SQL statements. Items are stored as an append-only arena per job,
//! addressed by `(job_id, position)`; the driver updates slots in place
//! after each item transition so a crash mid-run leaves prior items intact.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::models::{
    Dataset, Frequency, HarvestError, HarvestItem, HarvestJob, HarvestSource, HarvestStage,
    ItemStatus, JobStatus, Resource,
};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn opt_ts(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(|d| d.timestamp())
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn from_opt_ts(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.map(from_ts)
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database, creating it and its parent directory
    /// on first use. Foreign keys are enforced for the job/item/error
    /// relations, and a busy timeout covers scheduler and CLI runs sharing
    /// one database file.
    pub async fn connect(config: &Config) -> Result<Self> {
        let db_path = &config.db.path;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ── Sources ──────────────────────────────────────────────────────────

    pub async fn create_source(&self, source: &HarvestSource) -> Result<()> {
        let config_json = serde_json::to_string(&source.config)?;
        sqlx::query(
            r#"
            INSERT INTO harvest_sources (id, slug, name, url, backend, config_json,
                                         frequency, active, owner, organization, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.id)
        .bind(&source.slug)
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.backend)
        .bind(&config_json)
        .bind(source.frequency.as_str())
        .bind(source.active as i64)
        .bind(&source.owner)
        .bind(&source.organization)
        .bind(ts(source.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn source_by_slug(&self, slug: &str) -> Result<Option<HarvestSource>> {
        let row = sqlx::query("SELECT * FROM harvest_sources WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.map(source_from_row).transpose()
    }

    pub async fn list_sources(&self) -> Result<Vec<HarvestSource>> {
        let rows = sqlx::query("SELECT * FROM harvest_sources ORDER BY slug ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(source_from_row).collect()
    }

    /// Returns true if a source was deleted. Sources are never auto-deleted;
    /// this backs the explicit `source delete` command only. Job history
    /// cascades with the source; harvested datasets are kept.
    pub async fn delete_source(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM harvest_sources WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Jobs ─────────────────────────────────────────────────────────────

    pub async fn create_job(&self, job: &HarvestJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO harvest_jobs (id, source_id, status, created_at, started_at, ended_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.source_id)
        .bind(job.status.as_str())
        .bind(ts(job.created_at))
        .bind(opt_ts(job.started_at))
        .bind(opt_ts(job.ended_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update a job's status and timestamps. Jobs already in a terminal
    /// state are immutable; a write against one is refused.
    pub async fn update_job(&self, job: &HarvestJob) -> Result<()> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT status FROM harvest_jobs WHERE id = ?")
                .bind(&job.id)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(status) = stored {
            if JobStatus::parse(&status).map(|s| s.is_terminal()).unwrap_or(false) {
                anyhow::bail!("job {} is {status} and cannot be updated", job.id);
            }
        }

        sqlx::query("UPDATE harvest_jobs SET status = ?, started_at = ?, ended_at = ? WHERE id = ?")
            .bind(job.status.as_str())
            .bind(opt_ts(job.started_at))
            .bind(opt_ts(job.ended_at))
            .bind(&job.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist the full discovered item list in one transaction, in
    /// discovery order.
    pub async fn insert_items(&self, job: &HarvestJob) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (position, item) in job.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO harvest_items (job_id, position, remote_id, payload,
                                           status, started_at, ended_at, dataset_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&job.id)
            .bind(position as i64)
            .bind(&item.remote_id)
            .bind(&item.payload)
            .bind(item.status.as_str())
            .bind(opt_ts(item.started_at))
            .bind(opt_ts(item.ended_at))
            .bind(&item.dataset_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Update one item slot in place; its errors are appended separately.
    pub async fn update_item(
        &self,
        job_id: &str,
        position: usize,
        item: &HarvestItem,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE harvest_items
            SET status = ?, started_at = ?, ended_at = ?, dataset_id = ?
            WHERE job_id = ? AND position = ?
            "#,
        )
        .bind(item.status.as_str())
        .bind(opt_ts(item.started_at))
        .bind(opt_ts(item.ended_at))
        .bind(&item.dataset_id)
        .bind(job_id)
        .bind(position as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn append_error(
        &self,
        job_id: &str,
        item_position: Option<usize>,
        error: &HarvestError,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO harvest_errors (job_id, item_position, stage, message, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job_id)
        .bind(item_position.map(|p| p as i64))
        .bind(error.stage.as_str())
        .bind(&error.message)
        .bind(&error.details)
        .bind(ts(error.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a job with its items and errors re-attached.
    pub async fn job(&self, job_id: &str) -> Result<Option<HarvestJob>> {
        let row = sqlx::query("SELECT * FROM harvest_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let mut job = job_from_row(&row)?;
        self.load_job_details(&mut job).await?;
        Ok(Some(job))
    }

    pub async fn jobs_for_source(&self, source_id: &str, limit: i64) -> Result<Vec<HarvestJob>> {
        let rows = sqlx::query(
            "SELECT * FROM harvest_jobs WHERE source_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(source_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut job = job_from_row(row)?;
            self.load_job_details(&mut job).await?;
            jobs.push(job);
        }
        Ok(jobs)
    }

    pub async fn last_job(&self, source_id: &str) -> Result<Option<HarvestJob>> {
        Ok(self.jobs_for_source(source_id, 1).await?.into_iter().next())
    }

    async fn load_job_details(&self, job: &mut HarvestJob) -> Result<()> {
        let item_rows = sqlx::query(
            "SELECT * FROM harvest_items WHERE job_id = ? ORDER BY position ASC",
        )
        .bind(&job.id)
        .fetch_all(&self.pool)
        .await?;

        job.items = item_rows.iter().map(item_from_row).collect::<Result<_>>()?;

        let error_rows = sqlx::query(
            "SELECT * FROM harvest_errors WHERE job_id = ? ORDER BY id ASC",
        )
        .bind(&job.id)
        .fetch_all(&self.pool)
        .await?;

        for row in &error_rows {
            let error = error_from_row(row)?;
            let item_position: Option<i64> = row.get("item_position");
            match item_position {
                Some(pos) => {
                    if let Some(item) = job.items.get_mut(pos as usize) {
                        item.errors.push(error);
                    }
                }
                None => job.errors.push(error),
            }
        }
        Ok(())
    }

    // ── Datasets ─────────────────────────────────────────────────────────

    /// Provenance lookup: the reconciliation engine's only query path.
    /// Titles and slugs are deliberately not part of the filter.
    pub async fn find_dataset(&self, remote_id: &str, domain: &str) -> Result<Option<Dataset>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM datasets
            WHERE json_extract(extras_json, '$."harvest:remote_id"') = ?
              AND json_extract(extras_json, '$."harvest:domain"') = ?
            LIMIT 1
            "#,
        )
        .bind(remote_id)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(dataset_from_row).transpose()
    }

    pub async fn upsert_dataset(&self, dataset: &Dataset) -> Result<()> {
        let tags_json = serde_json::to_string(&dataset.tags)?;
        let resources_json = serde_json::to_string(&dataset.resources)?;
        let extras_json = serde_json::to_string(&dataset.extras)?;
        sqlx::query(
            r#"
            INSERT INTO datasets (id, title, description, tags_json, license, landing_page,
                                  resources_json, owner, organization, extras_json,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                tags_json = excluded.tags_json,
                license = excluded.license,
                landing_page = excluded.landing_page,
                resources_json = excluded.resources_json,
                owner = excluded.owner,
                organization = excluded.organization,
                extras_json = excluded.extras_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&dataset.id)
        .bind(&dataset.title)
        .bind(&dataset.description)
        .bind(&tags_json)
        .bind(&dataset.license)
        .bind(&dataset.landing_page)
        .bind(&resources_json)
        .bind(&dataset.owner)
        .bind(&dataset.organization)
        .bind(&extras_json)
        .bind(ts(dataset.created_at))
        .bind(ts(dataset.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn dataset(&self, id: &str) -> Result<Option<Dataset>> {
        let row = sqlx::query("SELECT * FROM datasets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(dataset_from_row).transpose()
    }

    pub async fn count_datasets(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM datasets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn source_from_row(row: sqlx::sqlite::SqliteRow) -> Result<HarvestSource> {
    let config_json: String = row.get("config_json");
    let config: BTreeMap<String, String> = serde_json::from_str(&config_json)?;
    let frequency: String = row.get("frequency");
    let active: i64 = row.get("active");
    Ok(HarvestSource {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        url: row.get("url"),
        backend: row.get("backend"),
        config,
        frequency: Frequency::parse(&frequency)
            .ok_or_else(|| anyhow::anyhow!("invalid frequency '{frequency}' in database"))?,
        active: active != 0,
        owner: row.get("owner"),
        organization: row.get("organization"),
        created_at: from_ts(row.get("created_at")),
    })
}

fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<HarvestJob> {
    let status: String = row.get("status");
    Ok(HarvestJob {
        id: row.get("id"),
        source_id: row.get("source_id"),
        status: JobStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("invalid job status '{status}' in database"))?,
        created_at: from_ts(row.get("created_at")),
        started_at: from_opt_ts(row.get("started_at")),
        ended_at: from_opt_ts(row.get("ended_at")),
        items: Vec::new(),
        errors: Vec::new(),
    })
}

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<HarvestItem> {
    let status: String = row.get("status");
    Ok(HarvestItem {
        remote_id: row.get("remote_id"),
        payload: row.get("payload"),
        status: ItemStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("invalid item status '{status}' in database"))?,
        started_at: from_opt_ts(row.get("started_at")),
        ended_at: from_opt_ts(row.get("ended_at")),
        errors: Vec::new(),
        dataset_id: row.get("dataset_id"),
    })
}

fn error_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<HarvestError> {
    let stage: String = row.get("stage");
    Ok(HarvestError {
        created_at: from_ts(row.get("created_at")),
        message: row.get("message"),
        details: row.get("details"),
        stage: HarvestStage::parse(&stage)
            .ok_or_else(|| anyhow::anyhow!("invalid error stage '{stage}' in database"))?,
    })
}

fn dataset_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Dataset> {
    let tags_json: String = row.get("tags_json");
    let resources_json: String = row.get("resources_json");
    let extras_json: String = row.get("extras_json");
    Ok(Dataset {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        tags: serde_json::from_str(&tags_json)?,
        license: row.get("license"),
        landing_page: row.get("landing_page"),
        resources: serde_json::from_str::<Vec<Resource>>(&resources_json)?,
        owner: row.get("owner"),
        organization: row.get("organization"),
        extras: serde_json::from_str(&extras_json)?,
        created_at: from_ts(row.get("created_at")),
        updated_at: from_ts(row.get("updated_at")),
    })
}

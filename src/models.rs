//! Core data models used throughout the harvester.
//!
//! These types represent the sources, jobs, items, and datasets that flow
//! through the harvesting pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance extras stamped on every harvested dataset.
///
/// The harvester is the sole writer of these keys; reconciliation looks
/// datasets up by `(remote_id, domain)`, never by title or slug.
pub mod extras {
    pub const SOURCE_ID: &str = "harvest:source_id";
    pub const REMOTE_ID: &str = "harvest:remote_id";
    pub const DOMAIN: &str = "harvest:domain";
    pub const LAST_UPDATE: &str = "harvest:last_update";
}

/// How often a source is harvested by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Manual,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Manual => "manual",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Frequency::Manual),
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            _ => None,
        }
    }
}

/// A configured external catalog to harvest.
#[derive(Debug, Clone)]
pub struct HarvestSource {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub url: String,
    /// Backend name resolved through the registry (e.g. `"dcat"`, `"csv"`).
    pub backend: String,
    /// Free-form backend configuration (column mappings, etc.).
    pub config: BTreeMap<String, String>,
    pub frequency: Frequency,
    pub active: bool,
    pub owner: Option<String>,
    pub organization: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HarvestSource {
    /// The domain this source harvests from, derived from its URL host.
    ///
    /// Part of the provenance pair: two sources pointing at the same host
    /// reconcile against the same datasets.
    pub fn domain(&self) -> String {
        self.url
            .split("//")
            .nth(1)
            .unwrap_or(&self.url)
            .split('/')
            .next()
            .unwrap_or(&self.url)
            .to_string()
    }
}

/// Job lifecycle states.
///
/// `pending → initializing → initialized|failed → done|done-errors`.
/// A job is immutable once it reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Initializing,
    Initialized,
    Failed,
    Done,
    DoneWithErrors,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Initializing => "initializing",
            JobStatus::Initialized => "initialized",
            JobStatus::Failed => "failed",
            JobStatus::Done => "done",
            JobStatus::DoneWithErrors => "done-errors",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "initializing" => Some(JobStatus::Initializing),
            "initialized" => Some(JobStatus::Initialized),
            "failed" => Some(JobStatus::Failed),
            "done" => Some(JobStatus::Done),
            "done-errors" => Some(JobStatus::DoneWithErrors),
            _ => None,
        }
    }

    /// Terminal jobs are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Done | JobStatus::DoneWithErrors
        )
    }
}

/// One execution of a source's harvest.
#[derive(Debug, Clone)]
pub struct HarvestJob {
    pub id: String,
    pub source_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Append-only, ordered by discovery; item slots are updated in place.
    pub items: Vec<HarvestItem>,
    /// Job-level errors (initialization failures).
    pub errors: Vec<HarvestError>,
}

impl HarvestJob {
    pub fn new(source_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Item lifecycle states: `pending → started → done|failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Pending,
    Started,
    Done,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Started => "started",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "started" => Some(ItemStatus::Started),
            "done" => Some(ItemStatus::Done),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }
}

/// One remote record within a job.
#[derive(Debug, Clone)]
pub struct HarvestItem {
    /// Stable identifier of the record on the remote catalog.
    pub remote_id: String,
    /// Opaque payload captured at discovery time, re-parsed by the backend
    /// during processing (e.g. an N-Triples subgraph, a JSON row).
    pub payload: String,
    pub status: ItemStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub errors: Vec<HarvestError>,
    /// Set once the produced dataset has been persisted (never in dry-run).
    pub dataset_id: Option<String>,
}

impl HarvestItem {
    pub fn new(remote_id: &str, payload: String) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            payload,
            status: ItemStatus::Pending,
            started_at: None,
            ended_at: None,
            errors: Vec::new(),
            dataset_id: None,
        }
    }
}

/// Stage at which a harvest error occurred. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestStage {
    /// Discovery of the remote source failed (job-fatal).
    Gather,
    /// An individual record failed to fetch or parse.
    Fetch,
    /// Persisting the produced dataset failed.
    Store,
    /// The produced dataset failed structural validation.
    Validation,
}

impl HarvestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarvestStage::Gather => "gather",
            HarvestStage::Fetch => "fetch",
            HarvestStage::Store => "store",
            HarvestStage::Validation => "validation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gather" => Some(HarvestStage::Gather),
            "fetch" => Some(HarvestStage::Fetch),
            "store" => Some(HarvestStage::Store),
            "validation" => Some(HarvestStage::Validation),
            _ => None,
        }
    }
}

/// An error recorded on a job or item. Append-only.
#[derive(Debug, Clone)]
pub struct HarvestError {
    pub created_at: DateTime<Utc>,
    pub message: String,
    /// Full error chain, for operators digging into a failed run.
    pub details: Option<String>,
    pub stage: HarvestStage,
}

impl HarvestError {
    pub fn new(stage: HarvestStage, message: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            message: message.into(),
            details: None,
            stage,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Capture an anyhow error with its full cause chain as details.
    pub fn from_anyhow(stage: HarvestStage, err: &anyhow::Error) -> Self {
        Self {
            created_at: Utc::now(),
            message: err.to_string(),
            details: Some(format!("{err:?}")),
            stage,
        }
    }
}

/// A downloadable file attached to a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    pub title: Option<String>,
    pub url: String,
    pub format: Option<String>,
    pub checksum: Option<String>,
    pub size: Option<i64>,
}

/// The reconciliation target: a local dataset produced from remote records.
///
/// Invariant: at most one dataset exists per `(remote_id, domain)` pair;
/// re-running a harvest updates it in place instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub license: Option<String>,
    pub landing_page: Option<String>,
    pub resources: Vec<Resource>,
    pub owner: Option<String>,
    pub organization: Option<String>,
    pub extras: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    /// A new, unsaved dataset with a fresh identifier.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: String::new(),
            description: None,
            tags: Vec::new(),
            license: None,
            landing_page: None,
            resources: Vec::new(),
            owner: None,
            organization: None,
            extras: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Structural validation, used as-is by the dry-run gate.
    pub fn validate(&self) -> Result<(), crate::error::BackendError> {
        if self.title.trim().is_empty() {
            return Err(crate::error::BackendError::Validation {
                field: "title".to_string(),
                message: "title must not be empty".to_string(),
            });
        }
        for (i, resource) in self.resources.iter().enumerate() {
            if resource.url.trim().is_empty() {
                return Err(crate::error::BackendError::Validation {
                    field: format!("resources.{i}.url"),
                    message: "resource url must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

//! Harvest lifecycle orchestration.
//!
//! Drives one run of a source's backend through the job state machine:
//! initialize → process items → finalize. The driver owns all retry and
//! partial-failure bookkeeping; backends only discover and transform.
//!
//! Items are processed strictly sequentially, in discovery order, and job
//! state is persisted after every item transition — a crash mid-run leaves
//! completed items `done` and the crashed one `started` for inspection.
//! Nothing guards against two concurrent runs of the same source from
//! separate processes; the scheduler never overlaps them within one.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use crate::error::BackendError;
use crate::fetch::Fetcher;
use crate::models::{
    extras, HarvestError, HarvestItem, HarvestJob, HarvestSource, HarvestStage, ItemStatus,
    JobStatus,
};
use crate::notify::{HarvestEvent, Notifier};
use crate::registry::{BackendContext, BackendRegistry, HarvestBackend};
use crate::store::Store;

/// Tagged result of processing one item. Errors never escape item
/// processing; they are converted to this at the driver boundary.
enum ItemOutcome {
    /// Dataset id when persisted; `None` in dry-run.
    Done(Option<String>),
    Failed(HarvestError),
}

/// Execute one harvest run for the source with the given slug.
///
/// Backend resolution happens before any job row is created, so an
/// unknown backend name fails fast as a configuration error. In dry-run
/// mode datasets are validated but never persisted and no item→dataset
/// links are established.
pub async fn run_harvest(
    store: &Store,
    registry: &BackendRegistry,
    notifier: &Notifier,
    fetcher: Arc<dyn Fetcher>,
    slug: &str,
    dry_run: bool,
) -> Result<HarvestJob> {
    let source = store
        .source_by_slug(slug)
        .await?
        .ok_or_else(|| BackendError::SourceNotFound(slug.to_string()))?;

    let factory = registry.get(&source.backend)?;
    let backend = factory.create(BackendContext::new(
        source.clone(),
        fetcher,
        store.clone(),
    ));

    let job = HarvestJob::new(&source.id);
    let mut harvester = Harvester {
        source,
        backend,
        store: store.clone(),
        notifier,
        dry_run,
        job,
    };

    if harvester.perform_initialization().await? {
        harvester.process_items().await?;
        harvester.finalize().await?;
    }

    Ok(harvester.job)
}

struct Harvester<'a> {
    source: HarvestSource,
    backend: Box<dyn HarvestBackend>,
    store: Store,
    notifier: &'a Notifier,
    dry_run: bool,
    job: HarvestJob,
}

impl Harvester<'_> {
    /// Create the job record and run backend discovery. Returns false when
    /// initialization failed and the job was finalized as `failed`.
    async fn perform_initialization(&mut self) -> Result<bool> {
        tracing::debug!(source = self.source.slug.as_str(), "initializing backend");
        self.job.status = JobStatus::Initializing;
        self.job.started_at = Some(Utc::now());
        self.store.create_job(&self.job).await?;

        self.notifier.notify(&HarvestEvent::JobStarted {
            source: &self.source,
            job: &self.job,
        });

        match self.backend.initialize().await {
            Ok(new_items) => {
                self.job.items = new_items
                    .into_iter()
                    .map(|item| HarvestItem::new(&item.remote_id, item.payload))
                    .collect();
                self.store.insert_items(&self.job).await?;
                self.job.status = JobStatus::Initialized;
                self.store.update_job(&self.job).await?;
                tracing::debug!(
                    source = self.source.slug.as_str(),
                    queued = self.job.items.len(),
                    "queued items"
                );
                Ok(true)
            }
            Err(err) => {
                tracing::error!(
                    source = self.source.slug.as_str(),
                    error = %err,
                    "initialization failed"
                );
                let error = HarvestError::from_anyhow(HarvestStage::Gather, &err);
                self.store.append_error(&self.job.id, None, &error).await?;
                self.job.errors.push(error);
                self.job.status = JobStatus::Failed;
                self.end().await?;
                Ok(false)
            }
        }
    }

    /// Process the items discovered during initialization, one by one.
    /// A failure in one item never aborts the rest.
    async fn process_items(&mut self) -> Result<()> {
        for position in 0..self.job.items.len() {
            self.process_item(position).await?;
        }
        Ok(())
    }

    async fn process_item(&mut self, position: usize) -> Result<()> {
        {
            let item = &mut self.job.items[position];
            tracing::debug!(remote_id = item.remote_id.as_str(), "processing item");
            item.status = ItemStatus::Started;
            item.started_at = Some(Utc::now());
        }
        self.store
            .update_item(&self.job.id, position, &self.job.items[position])
            .await?;

        let outcome = self.process_one(position).await;

        let item = &mut self.job.items[position];
        match outcome {
            ItemOutcome::Done(dataset_id) => {
                item.dataset_id = dataset_id;
                item.status = ItemStatus::Done;
            }
            ItemOutcome::Failed(error) => {
                tracing::error!(
                    remote_id = item.remote_id.as_str(),
                    error = error.message.as_str(),
                    "failed to process item"
                );
                item.status = ItemStatus::Failed;
                self.store
                    .append_error(&self.job.id, Some(position), &error)
                    .await?;
                item.errors.push(error);
            }
        }
        item.ended_at = Some(Utc::now());
        self.store
            .update_item(&self.job.id, position, &self.job.items[position])
            .await?;
        Ok(())
    }

    /// The narrow boundary where backend and store errors become tagged
    /// outcomes instead of propagating.
    async fn process_one(&self, position: usize) -> ItemOutcome {
        let item = &self.job.items[position];

        let mut dataset = match self.backend.process(item).await {
            Ok(dataset) => dataset,
            Err(err) => {
                return ItemOutcome::Failed(HarvestError::from_anyhow(HarvestStage::Fetch, &err))
            }
        };

        dataset
            .extras
            .insert(extras::SOURCE_ID.to_string(), self.source.id.clone());
        dataset
            .extras
            .insert(extras::REMOTE_ID.to_string(), item.remote_id.clone());
        dataset
            .extras
            .insert(extras::DOMAIN.to_string(), self.source.domain());
        dataset
            .extras
            .insert(extras::LAST_UPDATE.to_string(), Utc::now().to_rfc3339());

        if dataset.organization.is_none() && dataset.owner.is_none() {
            if let Some(organization) = &self.source.organization {
                dataset.organization = Some(organization.clone());
            } else if let Some(owner) = &self.source.owner {
                dataset.owner = Some(owner.clone());
            }
        }

        if let Err(err) = dataset.validate() {
            return ItemOutcome::Failed(
                HarvestError::new(HarvestStage::Validation, err.to_string())
                    .with_details(format!("{err:?}")),
            );
        }

        if self.dry_run {
            // Validation passed; nothing is persisted and no link is made.
            return ItemOutcome::Done(None);
        }

        dataset.updated_at = Utc::now();
        match self.store.upsert_dataset(&dataset).await {
            Ok(()) => ItemOutcome::Done(Some(dataset.id)),
            Err(err) => ItemOutcome::Failed(HarvestError::from_anyhow(HarvestStage::Store, &err)),
        }
    }

    async fn finalize(&mut self) -> Result<()> {
        self.job.status = if self.job.items.iter().any(|i| !i.errors.is_empty()) {
            JobStatus::DoneWithErrors
        } else {
            JobStatus::Done
        };
        self.end().await
    }

    async fn end(&mut self) -> Result<()> {
        self.job.ended_at = Some(Utc::now());
        self.store.update_job(&self.job).await?;
        self.notifier.notify(&HarvestEvent::JobFinished {
            source: &self.source,
            job: &self.job,
        });
        Ok(())
    }
}

//! The backend contract and the backend registry.
//!
//! A backend implements discovery ([`HarvestBackend::initialize`]) and
//! per-item transformation ([`HarvestBackend::process`]); the lifecycle
//! driver in [`crate::harvest`] supplies everything else, including error
//! isolation, so format-specific code never handles partial-failure
//! bookkeeping itself.
//!
//! The registry is an explicit object built at process start and passed by
//! reference to whatever resolves backend names; there is no global
//! mutable table.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::BackendError;
use crate::fetch::Fetcher;
use crate::models::{Dataset, HarvestItem, HarvestSource};
use crate::store::Store;

/// A remote record discovered during initialization, before it becomes a
/// persisted [`HarvestItem`].
#[derive(Debug, Clone)]
pub struct NewItem {
    pub remote_id: String,
    /// Opaque to everything but the backend that wrote it.
    pub payload: String,
}

/// Everything a backend may touch: its source configuration, the fetch
/// collaborator, and the reconciliation engine.
pub struct BackendContext {
    pub source: HarvestSource,
    pub fetcher: Arc<dyn Fetcher>,
    store: Store,
}

impl BackendContext {
    pub fn new(source: HarvestSource, fetcher: Arc<dyn Fetcher>, store: Store) -> Self {
        Self {
            source,
            fetcher,
            store,
        }
    }

    /// Reconciliation engine: resolve a remote record to the existing local
    /// dataset carrying its provenance pair, or hand out a new, unsaved
    /// dataset. Lookup is by `(remote_id, domain)` only — local title edits
    /// never break reconciliation on the next run.
    pub async fn get_dataset(&self, remote_id: &str) -> Result<Dataset> {
        let existing = self
            .store
            .find_dataset(remote_id, &self.source.domain())
            .await?;
        Ok(existing.unwrap_or_default())
    }
}

/// A format-specific harvester (DCAT/RDF, CSV, ...).
#[async_trait]
pub trait HarvestBackend: Send + Sync {
    /// Enumerate the remote source and return one [`NewItem`] per record.
    /// Any error here is job-fatal: the run ends `failed` with a
    /// job-level gather error and no items are processed.
    async fn initialize(&mut self) -> Result<Vec<NewItem>>;

    /// Transform one discovered item's payload into a dataset, reconciled
    /// through [`BackendContext::get_dataset`]. Errors here are isolated
    /// to the item.
    async fn process(&self, item: &HarvestItem) -> Result<Dataset>;
}

/// Creates backend instances bound to a source.
pub trait BackendFactory: Send + Sync {
    /// The name sources reference in their `backend` field.
    fn name(&self) -> &'static str;

    /// One-line description for `odh status` output.
    fn description(&self) -> &'static str;

    fn create(&self, ctx: BackendContext) -> Box<dyn HarvestBackend>;
}

impl std::fmt::Debug for dyn BackendFactory + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendFactory")
            .field("name", &self.name())
            .finish()
    }
}

/// Registry of harvest backends, keyed by backend name.
pub struct BackendRegistry {
    factories: Vec<Box<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Registry pre-loaded with the built-in backends (dcat, csv).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(Box::new(crate::backend_dcat::DcatFactory))
            .expect("built-in backend names are unique");
        registry
            .register(Box::new(crate::backend_csv::CsvFactory))
            .expect("built-in backend names are unique");
        registry
    }

    /// Register a backend. Name collisions are refused rather than
    /// silently letting the last registration win.
    pub fn register(&mut self, factory: Box<dyn BackendFactory>) -> Result<(), BackendError> {
        if self.factories.iter().any(|f| f.name() == factory.name()) {
            return Err(BackendError::DuplicateBackend(factory.name().to_string()));
        }
        self.factories.push(factory);
        Ok(())
    }

    /// Resolve a backend by name, failing fast before any job is created.
    pub fn get(&self, name: &str) -> Result<&dyn BackendFactory, BackendError> {
        self.factories
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
            .ok_or_else(|| BackendError::UnknownBackend(name.to_string()))
    }

    /// All registered factories, in registration order.
    pub fn factories(&self) -> &[Box<dyn BackendFactory>] {
        &self.factories
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

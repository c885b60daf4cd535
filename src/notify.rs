//! Lifecycle notifications.
//!
//! An explicit list of registered observers, invoked synchronously at job
//! boundaries. Fire-and-forget: return values are not consumed and an
//! observer cannot fail a run.

use crate::models::{HarvestJob, HarvestSource};

/// Events emitted at harvest lifecycle boundaries.
#[derive(Debug)]
pub enum HarvestEvent<'a> {
    JobStarted {
        source: &'a HarvestSource,
        job: &'a HarvestJob,
    },
    JobFinished {
        source: &'a HarvestSource,
        job: &'a HarvestJob,
    },
}

pub trait HarvestObserver: Send + Sync {
    fn on_event(&self, event: &HarvestEvent<'_>);
}

/// Holds the registered observers for one process.
#[derive(Default)]
pub struct Notifier {
    observers: Vec<Box<dyn HarvestObserver>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier with the tracing-backed observer installed.
    pub fn with_defaults() -> Self {
        let mut notifier = Self::new();
        notifier.subscribe(Box::new(LogObserver));
        notifier
    }

    pub fn subscribe(&mut self, observer: Box<dyn HarvestObserver>) {
        self.observers.push(observer);
    }

    pub fn notify(&self, event: &HarvestEvent<'_>) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Default observer: structured log lines per lifecycle boundary.
pub struct LogObserver;

impl HarvestObserver for LogObserver {
    fn on_event(&self, event: &HarvestEvent<'_>) {
        match event {
            HarvestEvent::JobStarted { source, job } => {
                tracing::info!(
                    source = source.slug.as_str(),
                    job = job.id.as_str(),
                    backend = source.backend.as_str(),
                    "harvest job started"
                );
            }
            HarvestEvent::JobFinished { source, job } => {
                let failed = job
                    .items
                    .iter()
                    .filter(|i| !i.errors.is_empty())
                    .count();
                tracing::info!(
                    source = source.slug.as_str(),
                    job = job.id.as_str(),
                    status = job.status.as_str(),
                    items = job.items.len(),
                    failed,
                    "harvest job finished"
                );
            }
        }
    }
}

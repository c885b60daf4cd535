//! CSV harvest backend.
//!
//! Treats each row of a remote CSV file as one dataset. Column-to-field
//! mapping is driven by the source configuration:
//!
//! | key                  | meaning                                  |
//! |----------------------|------------------------------------------|
//! | `id_column`          | column holding the remote id (required)  |
//! | `title_column`       | column mapped to the dataset title       |
//! | `description_column` | column mapped to the description         |
//! | `tags_column`        | column split on `;` or `,` into tags     |
//! | `url_column`         | column holding a downloadable file URL   |
//!
//! The payload stored per item is the row as a JSON object keyed by
//! header, so processing never re-fetches the remote file.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use crate::models::{Dataset, HarvestItem, Resource};
use crate::registry::{BackendContext, BackendFactory, HarvestBackend, NewItem};

pub struct CsvFactory;

impl BackendFactory for CsvFactory {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn description(&self) -> &'static str {
        "Harvest a CSV file with one dataset per row"
    }

    fn create(&self, ctx: BackendContext) -> Box<dyn HarvestBackend> {
        Box::new(CsvBackend { ctx })
    }
}

pub struct CsvBackend {
    ctx: BackendContext,
}

impl CsvBackend {
    fn column(&self, key: &str) -> Option<&str> {
        self.ctx
            .source
            .config
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    fn id_column(&self) -> Result<&str> {
        self.column("id_column")
            .ok_or_else(|| anyhow!("csv backend requires an id_column in the source config"))
    }
}

#[async_trait]
impl HarvestBackend for CsvBackend {
    async fn initialize(&mut self) -> Result<Vec<NewItem>> {
        let id_column = self.id_column()?.to_string();
        let document = self.ctx.fetcher.fetch(&self.ctx.source.url).await?;

        let mut reader = csv::Reader::from_reader(document.body.as_bytes());
        let headers = reader
            .headers()
            .context("reading CSV header row")?
            .clone();
        if !headers.iter().any(|h| h == id_column) {
            bail!("CSV file has no {id_column:?} column");
        }

        let mut items = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("reading CSV row {}", index + 2))?;
            let row: BTreeMap<&str, &str> = headers.iter().zip(record.iter()).collect();

            let remote_id = match row.get(id_column.as_str()) {
                Some(id) if !id.trim().is_empty() => id.trim().to_string(),
                _ => {
                    tracing::warn!(row = index + 2, "skipping CSV row without an id");
                    continue;
                }
            };

            items.push(NewItem {
                remote_id,
                payload: serde_json::to_string(&row)?,
            });
        }
        Ok(items)
    }

    async fn process(&self, item: &HarvestItem) -> Result<Dataset> {
        let row: BTreeMap<String, String> = serde_json::from_str(&item.payload)
            .with_context(|| format!("re-parsing payload of {}", item.remote_id))?;
        let cell = |key: Option<&str>| {
            key.and_then(|k| row.get(k))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let mut dataset = self.ctx.get_dataset(&item.remote_id).await?;

        if let Some(title) = cell(self.column("title_column")) {
            dataset.title = title.to_string();
        } else if dataset.title.is_empty() {
            dataset.title = item.remote_id.clone();
        }
        if let Some(description) = cell(self.column("description_column")) {
            dataset.description = Some(description.to_string());
        }
        if let Some(tags) = cell(self.column("tags_column")) {
            let mut parsed: Vec<String> = tags
                .split([';', ','])
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect();
            parsed.sort();
            parsed.dedup();
            dataset.tags = parsed;
        }
        if let Some(url) = cell(self.column("url_column")) {
            dataset.resources = vec![Resource {
                title: None,
                url: url.to_string(),
                format: None,
                checksum: None,
                size: None,
            }];
        }

        Ok(dataset)
    }
}

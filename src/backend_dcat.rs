//! DCAT/RDF harvest backend.
//!
//! Walks a linked-data catalog page by page, stores one isolated subgraph
//! per `dcat:Dataset` node as the item payload, and maps each subgraph
//! onto a reconciled dataset during processing.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use oxrdf::Graph;

use crate::dataset_rdf::dataset_from_rdf;
use crate::models::{Dataset, HarvestItem};
use crate::rdf::{self, ns};
use crate::registry::{BackendContext, BackendFactory, HarvestBackend, NewItem};

pub struct DcatFactory;

impl BackendFactory for DcatFactory {
    fn name(&self) -> &'static str {
        "dcat"
    }

    fn description(&self) -> &'static str {
        "Harvest a DCAT catalog over RDF (Turtle, N-Triples, RDF/XML)"
    }

    fn create(&self, ctx: BackendContext) -> Box<dyn HarvestBackend> {
        Box::new(DcatBackend { ctx })
    }
}

pub struct DcatBackend {
    ctx: BackendContext,
}

#[async_trait]
impl HarvestBackend for DcatBackend {
    async fn initialize(&mut self) -> Result<Vec<NewItem>> {
        let mut items = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut next = Some(self.ctx.source.url.clone());

        while let Some(url) = next {
            // Remote catalogs have shipped pagination loops; a revisited
            // page URL terminates the walk instead of spinning forever.
            if !visited.insert(url.clone()) {
                tracing::warn!(url = url.as_str(), "pagination cycle detected, stopping");
                break;
            }

            let document = self.ctx.fetcher.fetch(&url).await?;
            let format = rdf::guess_format(&url, document.content_type.as_deref())
                .ok_or_else(|| anyhow!("cannot determine RDF serialization of {url}"))?;
            let graph = rdf::parse_graph(&document.body, format, Some(&url))
                .with_context(|| format!("parsing {url}"))?;

            items.extend(dcat_datasets(&graph));
            next = rdf::pagination_next(&graph);
        }

        Ok(items)
    }

    async fn process(&self, item: &HarvestItem) -> Result<Dataset> {
        let graph = rdf::from_ntriples(&item.payload)
            .with_context(|| format!("re-parsing payload of {}", item.remote_id))?;
        let node = graph
            .subjects_for_predicate_object(oxrdf::vocab::rdf::TYPE, ns::dcat::DATASET)
            .next()
            .ok_or_else(|| anyhow!("payload of {} holds no dcat:Dataset node", item.remote_id))?;

        let dataset = self.ctx.get_dataset(&item.remote_id).await?;
        dataset_from_rdf(&graph, node, dataset)
    }
}

/// Extract one item per `dcat:Dataset` node, keyed by `dct:identifier`
/// (falling back to the node IRI), with a bounded subgraph as payload.
fn dcat_datasets(graph: &Graph) -> Vec<NewItem> {
    let mut items = Vec::new();
    for node in graph.subjects_for_predicate_object(oxrdf::vocab::rdf::TYPE, ns::dcat::DATASET) {
        let remote_id = match rdf::object_value(graph, node, ns::dct::IDENTIFIER) {
            Some(id) => id,
            None => match node {
                oxrdf::SubjectRef::NamedNode(n) => n.as_str().to_string(),
                _ => {
                    tracing::warn!("skipping dcat:Dataset blank node without dct:identifier");
                    continue;
                }
            },
        };

        let mut subgraph = Graph::new();
        rdf::extract_subgraph(graph, &mut subgraph, node, rdf::DCAT_NESTING);
        items.push(NewItem {
            remote_id,
            payload: rdf::to_ntriples(&subgraph),
        });
    }
    // Parse order of graph nodes is not stable; keep discovery order
    // deterministic across runs
    items.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));
    items
}

//! Mapping from a DCAT/RDF graph onto a [`Dataset`].
//!
//! Operates on the isolated per-item subgraph produced during discovery,
//! so lookups never scan the whole remote catalog.

use anyhow::Result;
use oxrdf::{Graph, SubjectRef, TermRef};

use crate::models::{Dataset, Resource};
use crate::rdf::{self, ns};

/// Map the RDF properties of `node` onto `dataset`, overwriting mapped
/// fields and leaving everything else (extras, ownership, timestamps)
/// untouched.
pub fn dataset_from_rdf(
    graph: &Graph,
    node: SubjectRef<'_>,
    mut dataset: Dataset,
) -> Result<Dataset> {
    if let Some(title) = rdf::object_value(graph, node, ns::dct::TITLE) {
        dataset.title = title;
    }
    dataset.description = rdf::object_value(graph, node, ns::dct::DESCRIPTION);
    dataset.license = rdf::url_from_rdf(graph, node, ns::dct::LICENSE);
    dataset.landing_page = rdf::url_from_rdf(graph, node, ns::dcat::LANDING_PAGE);

    let mut tags: Vec<String> = rdf::object_values(graph, node, ns::dcat::KEYWORD)
        .into_iter()
        .chain(
            rdf::object_values(graph, node, ns::dcat::THEME)
                .into_iter()
                .map(|theme| theme_label(&theme)),
        )
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    dataset.tags = tags;

    let mut resources = Vec::new();
    for predicate in [ns::dcat::DISTRIBUTION, ns::dcat::DISTRIBUTIONS] {
        for object in graph.objects_for_subject_predicate(node, predicate) {
            let dist = match object {
                TermRef::NamedNode(n) => SubjectRef::NamedNode(n),
                TermRef::BlankNode(b) => SubjectRef::BlankNode(b),
                _ => continue,
            };
            if let Some(resource) = resource_from_rdf(graph, dist) {
                resources.push(resource);
            }
        }
    }
    dataset.resources = resources;

    Ok(dataset)
}

/// A theme is either a plain label or a concept IRI; for IRIs the trailing
/// path segment is the usable label.
fn theme_label(theme: &str) -> String {
    if theme.starts_with("http://") || theme.starts_with("https://") {
        theme
            .trim_end_matches('/')
            .rsplit(['/', '#'])
            .next()
            .unwrap_or(theme)
            .to_string()
    } else {
        theme.to_string()
    }
}

fn resource_from_rdf(graph: &Graph, dist: SubjectRef<'_>) -> Option<Resource> {
    // A distribution without any URL is unusable; skip it
    let url = rdf::url_from_rdf(graph, dist, ns::dcat::DOWNLOAD_URL)
        .or_else(|| rdf::url_from_rdf(graph, dist, ns::dcat::ACCESS_URL))?;

    let checksum = graph
        .object_for_subject_predicate(dist, ns::spdx::CHECKSUM)
        .and_then(|term| match term {
            TermRef::NamedNode(n) => Some(SubjectRef::NamedNode(n)),
            TermRef::BlankNode(b) => Some(SubjectRef::BlankNode(b)),
            _ => None,
        })
        .and_then(|node| rdf::object_value(graph, node, ns::spdx::CHECKSUM_VALUE));

    let size = rdf::object_value(graph, dist, ns::dcat::BYTE_SIZE)
        .and_then(|value| value.parse::<i64>().ok());

    Some(Resource {
        title: rdf::object_value(graph, dist, ns::dct::TITLE),
        url,
        format: rdf::object_value(graph, dist, ns::dct::FORMAT)
            .or_else(|| rdf::url_from_rdf(graph, dist, ns::dcat::MEDIA_TYPE)),
        checksum,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdfio::RdfFormat;

    const DATASET_TTL: &str = r#"
        @prefix dcat: <http://www.w3.org/ns/dcat#> .
        @prefix dct: <http://purl.org/dc/terms/> .
        @prefix spdx: <http://spdx.org/rdf/terms#> .

        <http://example.org/d/1> a dcat:Dataset ;
            dct:identifier "1" ;
            dct:title "Air quality" ;
            dct:description "Hourly air quality measures" ;
            dct:license <http://example.org/licenses/odbl> ;
            dcat:keyword "Air", "quality" ;
            dcat:theme <http://example.org/themes/environment> ;
            dcat:landingPage <http://example.org/pages/1> ;
            dcat:distribution <http://example.org/d/1/r/1> .

        <http://example.org/d/1/r/1>
            dct:title "CSV export" ;
            dcat:downloadURL <http://example.org/files/1.csv> ;
            dct:format "text/csv" ;
            dcat:byteSize "1234" ;
            spdx:checksum _:ck .

        _:ck spdx:checksumValue "deadbeef" .
    "#;

    fn parse(data: &str) -> Graph {
        rdf::parse_graph(data, RdfFormat::Turtle, None).unwrap()
    }

    fn dataset_node(graph: &Graph) -> SubjectRef<'_> {
        graph
            .subjects_for_predicate_object(oxrdf::vocab::rdf::TYPE, ns::dcat::DATASET)
            .next()
            .unwrap()
    }

    #[test]
    fn maps_core_fields() {
        let graph = parse(DATASET_TTL);
        let dataset = dataset_from_rdf(&graph, dataset_node(&graph), Dataset::new()).unwrap();

        assert_eq!(dataset.title, "Air quality");
        assert_eq!(
            dataset.description.as_deref(),
            Some("Hourly air quality measures")
        );
        assert_eq!(
            dataset.license.as_deref(),
            Some("http://example.org/licenses/odbl")
        );
        assert_eq!(
            dataset.landing_page.as_deref(),
            Some("http://example.org/pages/1")
        );
        assert_eq!(dataset.tags, vec!["air", "environment", "quality"]);
    }

    #[test]
    fn maps_distribution_with_checksum() {
        let graph = parse(DATASET_TTL);
        let dataset = dataset_from_rdf(&graph, dataset_node(&graph), Dataset::new()).unwrap();

        assert_eq!(dataset.resources.len(), 1);
        let resource = &dataset.resources[0];
        assert_eq!(resource.url, "http://example.org/files/1.csv");
        assert_eq!(resource.title.as_deref(), Some("CSV export"));
        assert_eq!(resource.format.as_deref(), Some("text/csv"));
        assert_eq!(resource.checksum.as_deref(), Some("deadbeef"));
        assert_eq!(resource.size, Some(1234));
    }

    #[test]
    fn skips_distribution_without_url() {
        let graph = parse(
            r#"
            @prefix dcat: <http://www.w3.org/ns/dcat#> .
            @prefix dct: <http://purl.org/dc/terms/> .

            <http://example.org/d/1> a dcat:Dataset ;
                dct:title "No usable files" ;
                dcat:distribution _:d .
            _:d dct:title "Missing URL" .
            "#,
        );
        let dataset = dataset_from_rdf(&graph, dataset_node(&graph), Dataset::new()).unwrap();
        assert!(dataset.resources.is_empty());
    }

    #[test]
    fn local_edits_to_unmapped_fields_survive() {
        let graph = parse(DATASET_TTL);
        let mut existing = Dataset::new();
        existing
            .extras
            .insert("harvest:remote_id".to_string(), "1".to_string());
        existing.owner = Some("user-1".to_string());

        let dataset = dataset_from_rdf(&graph, dataset_node(&graph), existing).unwrap();
        assert_eq!(dataset.extras.get("harvest:remote_id").unwrap(), "1");
        assert_eq!(dataset.owner.as_deref(), Some("user-1"));
    }
}

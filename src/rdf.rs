//! RDF plumbing: vocabularies, format guessing, graph parsing, and
//! bounded subgraph extraction.
//!
//! The DCAT backend stores one isolated subgraph per dataset node in the
//! item payload instead of the whole catalog graph; [`extract_subgraph`]
//! copies a node's direct properties plus the nested neighborhoods named
//! by a [`NestingSpec`] (distributions and their checksums, temporal and
//! spatial coverage).

use std::fmt::Write as _;

use anyhow::{Context, Result};
use oxrdf::{Graph, NamedNodeRef, SubjectRef, TermRef, Triple};
use oxrdfio::{RdfFormat, RdfParser};

/// Vocabulary terms the harvester cares about.
pub mod ns {
    use oxrdf::NamedNodeRef;

    pub mod dcat {
        use super::NamedNodeRef;
        pub const DATASET: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#Dataset");
        pub const DISTRIBUTION: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#distribution");
        /// Misnamed plural seen in the wild; treated exactly like
        /// `dcat:distribution`.
        pub const DISTRIBUTIONS: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#distributions");
        pub const KEYWORD: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#keyword");
        pub const THEME: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#theme");
        pub const DOWNLOAD_URL: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#downloadURL");
        pub const ACCESS_URL: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#accessURL");
        pub const MEDIA_TYPE: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#mediaType");
        pub const BYTE_SIZE: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#byteSize");
        pub const LANDING_PAGE: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#landingPage");
    }

    pub mod dct {
        use super::NamedNodeRef;
        pub const IDENTIFIER: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/identifier");
        pub const TITLE: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/title");
        pub const DESCRIPTION: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/description");
        pub const LICENSE: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/license");
        pub const FORMAT: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/format");
        pub const TEMPORAL: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/temporal");
        pub const SPATIAL: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/spatial");
    }

    pub mod spdx {
        use super::NamedNodeRef;
        pub const CHECKSUM: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://spdx.org/rdf/terms#checksum");
        pub const CHECKSUM_VALUE: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://spdx.org/rdf/terms#checksumValue");
    }

    pub mod hydra {
        use super::NamedNodeRef;
        pub const PARTIAL_COLLECTION_VIEW: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/hydra/core#PartialCollectionView");
        pub const NEXT: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/hydra/core#next");
        pub const PAGED_COLLECTION: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/hydra/core#PagedCollection");
        pub const NEXT_PAGE: NamedNodeRef<'static> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/hydra/core#nextPage");
    }
}

/// The two supported pagination vocabularies: `(collection class, next
/// page property)`.
pub const KNOWN_PAGINATION: [(NamedNodeRef<'static>, NamedNodeRef<'static>); 2] = [
    (ns::hydra::PARTIAL_COLLECTION_VIEW, ns::hydra::NEXT),
    (ns::hydra::PAGED_COLLECTION, ns::hydra::NEXT_PAGE),
];

/// Guess the RDF serialization from the URL's file extension, falling back
/// to the Content-Type declared by the server.
pub fn guess_format(url: &str, content_type: Option<&str>) -> Option<RdfFormat> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext);
    if let Some(format) = extension.and_then(RdfFormat::from_extension) {
        return Some(format);
    }
    content_type.and_then(RdfFormat::from_media_type)
}

/// Parse a document into an in-memory graph. The base IRI resolves
/// relative references in the document against its own URL.
pub fn parse_graph(data: &str, format: RdfFormat, base_iri: Option<&str>) -> Result<Graph> {
    let mut parser = RdfParser::from_format(format);
    if let Some(base) = base_iri {
        parser = parser
            .with_base_iri(base)
            .with_context(|| format!("invalid base IRI: {base}"))?;
    }

    let mut graph = Graph::new();
    for quad in parser.for_reader(data.as_bytes()) {
        let quad = quad.context("RDF parse error")?;
        graph.insert(&Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(graph)
}

/// Which nested neighborhoods to pull into an isolated subgraph.
pub struct NestingSpec {
    pub predicate: NamedNodeRef<'static>,
    pub children: &'static [NestingSpec],
}

const CHECKSUM_NESTING: &[NestingSpec] = &[NestingSpec {
    predicate: ns::spdx::CHECKSUM,
    children: &[],
}];

/// Nested classes copied along with a DCAT dataset node.
pub const DCAT_NESTING: &[NestingSpec] = &[
    NestingSpec {
        predicate: ns::dcat::DISTRIBUTION,
        children: CHECKSUM_NESTING,
    },
    NestingSpec {
        predicate: ns::dcat::DISTRIBUTIONS,
        children: CHECKSUM_NESTING,
    },
    NestingSpec {
        predicate: ns::dct::TEMPORAL,
        children: &[],
    },
    NestingSpec {
        predicate: ns::dct::SPATIAL,
        children: &[],
    },
];

/// Copy `node`'s direct properties into `target`, recursing into the
/// neighborhoods listed in `specs`. Recursion depth is bounded by the
/// nesting structure, so cyclic graphs cannot loop it.
pub fn extract_subgraph(
    source: &Graph,
    target: &mut Graph,
    node: SubjectRef<'_>,
    specs: &[NestingSpec],
) {
    for triple in source.triples_for_subject(node) {
        target.insert(triple);
        if let Some(spec) = specs.iter().find(|s| s.predicate == triple.predicate) {
            let child = match triple.object {
                TermRef::NamedNode(n) => Some(SubjectRef::NamedNode(n)),
                TermRef::BlankNode(b) => Some(SubjectRef::BlankNode(b)),
                _ => None,
            };
            if let Some(child) = child {
                extract_subgraph(source, target, child, spec.children);
            }
        }
    }
}

/// Serialize a graph as N-Triples (the item payload format).
pub fn to_ntriples(graph: &Graph) -> String {
    let mut out = String::new();
    for triple in graph.iter() {
        let _ = writeln!(out, "{triple} .");
    }
    out
}

/// Parse an N-Triples item payload back into a graph.
pub fn from_ntriples(data: &str) -> Result<Graph> {
    parse_graph(data, RdfFormat::NTriples, None)
}

/// First literal or IRI value of `predicate` on `subject`, as a string.
pub fn object_value(
    graph: &Graph,
    subject: SubjectRef<'_>,
    predicate: NamedNodeRef<'_>,
) -> Option<String> {
    graph
        .object_for_subject_predicate(subject, predicate)
        .and_then(term_to_string)
}

/// All literal or IRI values of `predicate` on `subject`.
pub fn object_values(
    graph: &Graph,
    subject: SubjectRef<'_>,
    predicate: NamedNodeRef<'_>,
) -> Vec<String> {
    graph
        .objects_for_subject_predicate(subject, predicate)
        .filter_map(term_to_string)
        .collect()
}

/// A URL-valued property: either an IRI object or a literal holding one.
pub fn url_from_rdf(
    graph: &Graph,
    subject: SubjectRef<'_>,
    predicate: NamedNodeRef<'_>,
) -> Option<String> {
    match graph.object_for_subject_predicate(subject, predicate)? {
        TermRef::NamedNode(n) => Some(n.as_str().to_string()),
        TermRef::Literal(l) => Some(l.value().to_string()),
        _ => None,
    }
}

fn term_to_string(term: TermRef<'_>) -> Option<String> {
    match term {
        TermRef::Literal(l) => Some(l.value().to_string()),
        TermRef::NamedNode(n) => Some(n.as_str().to_string()),
        _ => None,
    }
}

/// Find the "next page" URL if the graph carries one of the supported
/// pagination shapes.
pub fn pagination_next(graph: &Graph) -> Option<String> {
    for (class, property) in KNOWN_PAGINATION {
        if let Some(page) = graph
            .subjects_for_predicate_object(oxrdf::vocab::rdf::TYPE, class)
            .next()
        {
            return url_from_rdf(graph, page, property);
        }
    }
    None
}

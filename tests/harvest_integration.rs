//! End-to-end harvest runs against an on-disk SQLite database and canned
//! remote documents.

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;

use opendata_harvester::config::Config;
use opendata_harvester::fetch::FixtureFetcher;
use opendata_harvester::harvest::run_harvest;
use opendata_harvester::models::{Frequency, HarvestJob, HarvestSource, HarvestStage, ItemStatus, JobStatus};
use opendata_harvester::notify::Notifier;
use opendata_harvester::registry::BackendRegistry;
use opendata_harvester::migrate;
use opendata_harvester::store::Store;

const CATALOG_URL: &str = "http://data.test.org/catalog.ttl";
const DOMAIN: &str = "data.test.org";

const CATALOG: &str = r#"
    @prefix dcat: <http://www.w3.org/ns/dcat#> .
    @prefix dct: <http://purl.org/dc/terms/> .

    <http://data.test.org/d/1> a dcat:Dataset ;
        dct:identifier "r-1" ;
        dct:title "Air quality" ;
        dcat:keyword "air" ;
        dcat:distribution <http://data.test.org/d/1/r/1> .

    <http://data.test.org/d/1/r/1> dcat:downloadURL <http://data.test.org/files/1.csv> .

    <http://data.test.org/d/2> a dcat:Dataset ;
        dct:identifier "r-2" ;
        dct:title "Bike counters" .

    <http://data.test.org/d/3> a dcat:Dataset ;
        dct:identifier "r-3" ;
        dct:title "Street trees" .
"#;

// Same catalog, but the second dataset has no title and fails validation.
const CATALOG_WITH_BAD_RECORD: &str = r#"
    @prefix dcat: <http://www.w3.org/ns/dcat#> .
    @prefix dct: <http://purl.org/dc/terms/> .

    <http://data.test.org/d/1> a dcat:Dataset ;
        dct:identifier "r-1" ;
        dct:title "Air quality" .

    <http://data.test.org/d/2> a dcat:Dataset ;
        dct:identifier "r-2" .

    <http://data.test.org/d/3> a dcat:Dataset ;
        dct:identifier "r-3" ;
        dct:title "Street trees" .
"#;

async fn setup() -> (Store, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::minimal();
    cfg.db.path = dir.path().join("odh.sqlite");
    migrate::run_migrations(&cfg).await.unwrap();
    let store = Store::connect(&cfg).await.unwrap();
    (store, dir)
}

async fn add_source(store: &Store, slug: &str, backend: &str, url: &str) -> HarvestSource {
    let source = HarvestSource {
        id: uuid::Uuid::new_v4().to_string(),
        slug: slug.to_string(),
        name: slug.to_string(),
        url: url.to_string(),
        backend: backend.to_string(),
        config: BTreeMap::new(),
        frequency: Frequency::Manual,
        active: true,
        owner: None,
        organization: Some("org-1".to_string()),
        created_at: chrono::Utc::now(),
    };
    store.create_source(&source).await.unwrap();
    source
}

async fn run(store: &Store, fetcher: FixtureFetcher, slug: &str, dry_run: bool) -> HarvestJob {
    let registry = BackendRegistry::with_builtins();
    let notifier = Notifier::new();
    run_harvest(store, &registry, &notifier, Arc::new(fetcher), slug, dry_run)
        .await
        .unwrap()
}

fn catalog_fetcher(body: &str) -> FixtureFetcher {
    FixtureFetcher::new().with_document(CATALOG_URL, body, Some("text/turtle"))
}

#[tokio::test]
async fn harvest_creates_datasets_with_provenance() {
    let (store, _dir) = setup().await;
    let source = add_source(&store, "paris", "dcat", CATALOG_URL).await;

    let job = run(&store, catalog_fetcher(CATALOG), "paris", false).await;

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.items.len(), 3);
    assert!(job
        .items
        .iter()
        .all(|i| i.status == ItemStatus::Done && i.dataset_id.is_some()));
    assert_eq!(store.count_datasets().await.unwrap(), 3);

    let dataset = store
        .find_dataset("r-1", DOMAIN)
        .await
        .unwrap()
        .expect("dataset reconciled by provenance");
    assert_eq!(dataset.title, "Air quality");
    assert_eq!(dataset.extras.get("harvest:source_id").unwrap(), &source.id);
    assert_eq!(dataset.extras.get("harvest:remote_id").unwrap(), "r-1");
    assert_eq!(dataset.extras.get("harvest:domain").unwrap(), DOMAIN);
    assert!(dataset.extras.contains_key("harvest:last_update"));
    // Ownership falls back to the source's organization
    assert_eq!(dataset.organization.as_deref(), Some("org-1"));
    assert_eq!(dataset.resources.len(), 1);

    // The item's back-reference points at the same dataset
    let linked_id = job.items[0].dataset_id.as_deref().unwrap();
    let linked = store.dataset(linked_id).await.unwrap().unwrap();
    assert_eq!(linked.id, dataset.id);
}

#[tokio::test]
async fn terminal_jobs_are_immutable() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    let mut job = run(&store, catalog_fetcher(CATALOG), "paris", false).await;
    assert_eq!(job.status, JobStatus::Done);

    job.status = JobStatus::Initializing;
    let err = store.update_job(&job).await.unwrap_err();
    assert!(err.to_string().contains("cannot be updated"));

    let reloaded = store.job(&job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Done);
}

#[tokio::test]
async fn deleting_a_source_drops_job_history_but_keeps_datasets() {
    let (store, _dir) = setup().await;
    let source = add_source(&store, "paris", "dcat", CATALOG_URL).await;

    let job = run(&store, catalog_fetcher(CATALOG), "paris", false).await;
    assert_eq!(store.count_datasets().await.unwrap(), 3);

    assert!(store.delete_source("paris").await.unwrap());

    assert!(store.source_by_slug("paris").await.unwrap().is_none());
    assert!(store
        .jobs_for_source(&source.id, 10)
        .await
        .unwrap()
        .is_empty());
    assert!(store.job(&job.id).await.unwrap().is_none());
    // Harvested datasets outlive their source
    assert_eq!(store.count_datasets().await.unwrap(), 3);
}

#[tokio::test]
async fn reharvest_updates_instead_of_duplicating() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    run(&store, catalog_fetcher(CATALOG), "paris", false).await;
    let first = store.find_dataset("r-2", DOMAIN).await.unwrap().unwrap();

    run(&store, catalog_fetcher(CATALOG), "paris", false).await;
    let second = store.find_dataset("r-2", DOMAIN).await.unwrap().unwrap();

    assert_eq!(store.count_datasets().await.unwrap(), 3);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn item_failures_do_not_abort_the_run() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    let job = run(
        &store,
        catalog_fetcher(CATALOG_WITH_BAD_RECORD),
        "paris",
        false,
    )
    .await;

    assert_eq!(job.status, JobStatus::DoneWithErrors);
    assert_eq!(job.items.len(), 3);

    let by_id = |id: &str| job.items.iter().find(|i| i.remote_id == id).unwrap();
    assert_eq!(by_id("r-1").status, ItemStatus::Done);
    assert_eq!(by_id("r-3").status, ItemStatus::Done);

    let failed = by_id("r-2");
    assert_eq!(failed.status, ItemStatus::Failed);
    assert_eq!(failed.errors.len(), 1);
    assert_eq!(failed.errors[0].stage, HarvestStage::Validation);
    assert!(failed.dataset_id.is_none());

    // The two good records were persisted anyway
    assert_eq!(store.count_datasets().await.unwrap(), 2);

    // The persisted job carries the same outcome
    let reloaded = store.job(&job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::DoneWithErrors);
    assert_eq!(reloaded.items.len(), 3);
    assert_eq!(reloaded.items[1].errors.len(), 1);
}

#[tokio::test]
async fn paginated_catalogs_are_merged() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    let page_1 = r#"
        @prefix dcat: <http://www.w3.org/ns/dcat#> .
        @prefix dct: <http://purl.org/dc/terms/> .
        @prefix hydra: <http://www.w3.org/ns/hydra/core#> .

        <http://data.test.org/catalog.ttl> a hydra:PartialCollectionView ;
            hydra:next <http://data.test.org/catalog.ttl?page=2> .

        <http://data.test.org/d/1> a dcat:Dataset ;
            dct:identifier "r-1" ;
            dct:title "Air quality" .
    "#;
    let page_2 = r#"
        @prefix dcat: <http://www.w3.org/ns/dcat#> .
        @prefix dct: <http://purl.org/dc/terms/> .

        <http://data.test.org/d/2> a dcat:Dataset ;
            dct:identifier "r-2" ;
            dct:title "Bike counters" .
    "#;

    let fetcher = FixtureFetcher::new()
        .with_document(CATALOG_URL, page_1, Some("text/turtle"))
        .with_document(
            "http://data.test.org/catalog.ttl?page=2",
            page_2,
            Some("text/turtle"),
        );

    let job = run(&store, fetcher, "paris", false).await;

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.items.len(), 2);
    assert_eq!(store.count_datasets().await.unwrap(), 2);
}

#[tokio::test]
async fn cyclic_pagination_terminates() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    // Page 2 points back at page 1
    let page_1 = r#"
        @prefix dcat: <http://www.w3.org/ns/dcat#> .
        @prefix dct: <http://purl.org/dc/terms/> .
        @prefix hydra: <http://www.w3.org/ns/hydra/core#> .

        <http://data.test.org/catalog.ttl> a hydra:PartialCollectionView ;
            hydra:next <http://data.test.org/catalog.ttl?page=2> .

        <http://data.test.org/d/1> a dcat:Dataset ;
            dct:identifier "r-1" ;
            dct:title "Air quality" .
    "#;
    let page_2 = r#"
        @prefix dcat: <http://www.w3.org/ns/dcat#> .
        @prefix dct: <http://purl.org/dc/terms/> .
        @prefix hydra: <http://www.w3.org/ns/hydra/core#> .

        <http://data.test.org/catalog.ttl?page=2> a hydra:PartialCollectionView ;
            hydra:next <http://data.test.org/catalog.ttl> .

        <http://data.test.org/d/2> a dcat:Dataset ;
            dct:identifier "r-2" ;
            dct:title "Bike counters" .
    "#;

    let fetcher = FixtureFetcher::new()
        .with_document(CATALOG_URL, page_1, Some("text/turtle"))
        .with_document(
            "http://data.test.org/catalog.ttl?page=2",
            page_2,
            Some("text/turtle"),
        );

    let job = run(&store, fetcher, "paris", false).await;

    // Each page contributes exactly once
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.items.len(), 2);
}

#[tokio::test]
async fn dry_run_persists_nothing() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    let job = run(&store, catalog_fetcher(CATALOG), "paris", true).await;

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.items.len(), 3);
    assert!(job
        .items
        .iter()
        .all(|i| i.status == ItemStatus::Done && i.dataset_id.is_none()));
    assert_eq!(store.count_datasets().await.unwrap(), 0);
}

#[tokio::test]
async fn dry_run_still_reports_validation_failures() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    let job = run(
        &store,
        catalog_fetcher(CATALOG_WITH_BAD_RECORD),
        "paris",
        true,
    )
    .await;

    assert_eq!(job.status, JobStatus::DoneWithErrors);
    assert_eq!(store.count_datasets().await.unwrap(), 0);
}

#[tokio::test]
async fn local_edits_do_not_break_reconciliation() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    run(&store, catalog_fetcher(CATALOG), "paris", false).await;

    // A local edit between runs changes the title but not the provenance
    let mut dataset = store.find_dataset("r-1", DOMAIN).await.unwrap().unwrap();
    let original_id = dataset.id.clone();
    dataset.title = "Renamed locally".to_string();
    store.upsert_dataset(&dataset).await.unwrap();

    run(&store, catalog_fetcher(CATALOG), "paris", false).await;

    let reharvested = store.find_dataset("r-1", DOMAIN).await.unwrap().unwrap();
    assert_eq!(reharvested.id, original_id);
    assert_eq!(reharvested.title, "Air quality");
    assert_eq!(store.count_datasets().await.unwrap(), 3);
}

#[tokio::test]
async fn initialization_failure_marks_the_job_failed() {
    let (store, _dir) = setup().await;
    add_source(&store, "paris", "dcat", CATALOG_URL).await;

    // No fixture registered: discovery cannot fetch the catalog
    let job = run(&store, FixtureFetcher::new(), "paris", false).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.items.is_empty());
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].stage, HarvestStage::Gather);
    assert!(job.ended_at.is_some());

    let reloaded = store.job(&job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Failed);
    assert_eq!(reloaded.errors.len(), 1);
}

#[tokio::test]
async fn unknown_backend_fails_before_creating_a_job() {
    let (store, _dir) = setup().await;
    let source = add_source(&store, "paris", "nope", CATALOG_URL).await;

    let registry = BackendRegistry::with_builtins();
    let notifier = Notifier::new();
    let err = run_harvest(
        &store,
        &registry,
        &notifier,
        Arc::new(FixtureFetcher::new()),
        "paris",
        false,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("nope"));
    assert!(store
        .jobs_for_source(&source.id, 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_source_is_an_error() {
    let (store, _dir) = setup().await;

    let registry = BackendRegistry::with_builtins();
    let notifier = Notifier::new();
    let err = run_harvest(
        &store,
        &registry,
        &notifier,
        Arc::new(FixtureFetcher::new()),
        "missing",
        false,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn csv_sources_harvest_end_to_end() {
    let (store, _dir) = setup().await;

    let mut config = BTreeMap::new();
    config.insert("id_column".to_string(), "ref".to_string());
    config.insert("title_column".to_string(), "name".to_string());
    let source = HarvestSource {
        id: uuid::Uuid::new_v4().to_string(),
        slug: "rows".to_string(),
        name: "Rows".to_string(),
        url: "http://data.test.org/datasets.csv".to_string(),
        backend: "csv".to_string(),
        config,
        frequency: Frequency::Manual,
        active: true,
        owner: Some("user-1".to_string()),
        organization: None,
        created_at: chrono::Utc::now(),
    };
    store.create_source(&source).await.unwrap();

    let fetcher = FixtureFetcher::new().with_document(
        "http://data.test.org/datasets.csv",
        "ref,name\nr-1,First\nr-2,Second\n",
        Some("text/csv"),
    );

    let job = run(&store, fetcher, "rows", false).await;

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.items.len(), 2);
    assert_eq!(store.count_datasets().await.unwrap(), 2);

    let dataset = store.find_dataset("r-1", DOMAIN).await.unwrap().unwrap();
    assert_eq!(dataset.title, "First");
    // Ownership falls back to the source's owner when it has no organization
    assert_eq!(dataset.owner.as_deref(), Some("user-1"));
}

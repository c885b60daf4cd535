//! # Open Data Harvester
//!
//! A pluggable harvesting engine for open-data catalogs.
//!
//! The harvester pulls dataset metadata from remote catalogs (DCAT/RDF
//! endpoints, CSV files), reconciles each remote record with the local
//! dataset it produced on earlier runs, and records a full audit trail of
//! every run as a job with per-item outcomes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Backends   │──▶│  Lifecycle   │──▶│  SQLite   │
//! │  DCAT/CSV   │   │ init→process │   │ jobs+data │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                                           ▼
//!                                      ┌──────────┐
//!                                      │   CLI    │
//!                                      │  (odh)   │
//!                                      └──────────┘
//! ```
//!
//! A harvest run is two phases: the backend enumerates the remote catalog
//! into items (initialization, job-fatal on error), then each item is
//! transformed into a dataset and persisted (processing, failures isolated
//! per item). Re-running a source updates the datasets it created before
//! instead of duplicating them, keyed by the `harvest:remote_id` and
//! `harvest:domain` provenance extras.
//!
//! ## Quick Start
//!
//! ```bash
//! odh init                                  # create database
//! odh source add open-paris \
//!     --name "Paris open data" \
//!     --url https://opendata.example.org/catalog.ttl \
//!     --backend dcat
//! odh run open-paris --dry-run              # validate without writing
//! odh run open-paris                        # harvest for real
//! odh jobs open-paris                       # inspect past runs
//! odh schedule                              # run due sources periodically
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and the job/item state machines |
//! | [`registry`] | Backend contract and registry |
//! | [`harvest`] | Harvest lifecycle driver |
//! | [`backend_dcat`] | DCAT/RDF backend with pagination |
//! | [`backend_csv`] | CSV row-per-dataset backend |
//! | [`rdf`] | RDF parsing, vocabularies, subgraph extraction |
//! | [`dataset_rdf`] | DCAT graph to dataset mapping |
//! | [`fetch`] | HTTP fetch abstraction |
//! | [`store`] | SQLite connection and persistence |
//! | [`scheduler`] | Frequency-based periodic runs |
//! | [`notify`] | Lifecycle observers |
//! | [`status`] | CLI status reports |
//! | [`migrate`] | Schema migrations |

pub mod backend_csv;
pub mod backend_dcat;
pub mod config;
pub mod dataset_rdf;
pub mod error;
pub mod fetch;
pub mod harvest;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod rdf;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod store;

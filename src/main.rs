//! # Open Data Harvester CLI (`odh`)
//!
//! The `odh` binary manages harvest sources and runs harvests against them.
//!
//! ## Usage
//!
//! ```bash
//! odh --config ./config/odh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `odh init` | Create the SQLite database and run schema migrations |
//! | `odh status` | Show sources, registered backends, and dataset counts |
//! | `odh source add <slug>` | Register a new harvest source |
//! | `odh source list` | List configured sources |
//! | `odh source delete <slug>` | Remove a source (its datasets stay) |
//! | `odh run <slug>` | Run one harvest; `--dry-run` validates only |
//! | `odh jobs <slug>` | Show recent jobs and their errors |
//! | `odh schedule` | Run due sources periodically until stopped |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! odh init --config ./config/odh.toml
//!
//! # Register a DCAT catalog
//! odh source add open-paris \
//!     --name "Paris open data" \
//!     --url https://opendata.example.org/catalog.ttl \
//!     --backend dcat --frequency daily
//!
//! # Register a CSV file, mapping its columns
//! odh source add rows \
//!     --name "Row catalog" \
//!     --url https://example.org/datasets.csv \
//!     --backend csv \
//!     --set id_column=ref --set title_column=name
//!
//! # Validate without writing anything
//! odh run open-paris --dry-run
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use opendata_harvester::fetch::HttpFetcher;
use opendata_harvester::models::{Frequency, HarvestSource};
use opendata_harvester::notify::Notifier;
use opendata_harvester::registry::BackendRegistry;
use opendata_harvester::store::Store;
use opendata_harvester::{config, harvest, migrate, scheduler, status};

/// Open Data Harvester CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/odh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "odh",
    about = "Open Data Harvester — pull dataset metadata from remote catalogs",
    version,
    long_about = "Open Data Harvester pulls dataset metadata from remote catalogs \
    (DCAT/RDF endpoints, CSV files), reconciles each remote record with the local \
    dataset it produced on earlier runs, and records every run as an auditable job."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/odh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent; running it multiple times is safe.
    Init,

    /// Show sources, registered backends, and dataset counts.
    Status,

    /// Manage harvest sources.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Run one harvest for a source.
    Run {
        /// Source slug.
        slug: String,

        /// Validate every record without persisting datasets.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show recent jobs for a source, newest first.
    Jobs {
        /// Source slug.
        slug: String,

        /// Maximum number of jobs to show.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Run due sources periodically until stopped.
    ///
    /// Wakes up every `schedule.tick_secs` and runs every active source
    /// whose frequency says it is due.
    Schedule {
        /// Override the tick interval from config, in seconds.
        #[arg(long)]
        interval: Option<u64>,
    },
}

/// Source management subcommands.
#[derive(Subcommand)]
enum SourceAction {
    /// Register a new harvest source.
    Add {
        /// Unique slug identifying the source in all commands.
        slug: String,

        /// Human-readable name.
        #[arg(long)]
        name: String,

        /// Remote catalog URL.
        #[arg(long)]
        url: String,

        /// Backend name (`dcat`, `csv`).
        #[arg(long)]
        backend: String,

        /// Run frequency: `manual`, `daily`, `weekly`, or `monthly`.
        #[arg(long, default_value = "manual")]
        frequency: String,

        /// User id that owns the harvested datasets.
        #[arg(long)]
        owner: Option<String>,

        /// Organization id that owns the harvested datasets.
        #[arg(long)]
        organization: Option<String>,

        /// Backend configuration as `key=value` pairs (repeatable).
        #[arg(long = "set", value_parser = parse_key_val)]
        config: Vec<(String, String)>,
    },

    /// List configured sources.
    List,

    /// Delete a source and its job history. Harvested datasets are kept.
    Delete {
        /// Source slug.
        slug: String,
    },
}

/// Parse a `key=value` pair for `--set` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let store = Store::connect(&cfg).await?;
    let registry = BackendRegistry::with_builtins();
    let notifier = Notifier::with_defaults();

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Status => {
            status::print_status(&store, &registry).await?;
        }
        Commands::Source { action } => match action {
            SourceAction::Add {
                slug,
                name,
                url,
                backend,
                frequency,
                owner,
                organization,
                config,
            } => {
                // Fail on unknown backends before writing anything.
                registry.get(&backend)?;
                let frequency = Frequency::parse(&frequency).ok_or_else(|| {
                    anyhow::anyhow!(
                        "invalid frequency '{frequency}' (expected manual, daily, weekly, monthly)"
                    )
                })?;
                let source = HarvestSource {
                    id: uuid::Uuid::new_v4().to_string(),
                    slug: slug.clone(),
                    name,
                    url,
                    backend,
                    config: config.into_iter().collect(),
                    frequency,
                    active: true,
                    owner,
                    organization,
                    created_at: chrono::Utc::now(),
                };
                store.create_source(&source).await?;
                println!("Source '{slug}' added.");
            }
            SourceAction::List => {
                status::print_sources(&store).await?;
            }
            SourceAction::Delete { slug } => {
                if store.delete_source(&slug).await? {
                    println!("Source '{slug}' deleted.");
                } else {
                    println!("No source named '{slug}'.");
                }
            }
        },
        Commands::Run { slug, dry_run } => {
            let fetcher = Arc::new(HttpFetcher::new(&cfg)?);
            let job =
                harvest::run_harvest(&store, &registry, &notifier, fetcher, &slug, dry_run).await?;
            let failed = job.items.iter().filter(|i| !i.errors.is_empty()).count();
            println!(
                "Job {} finished: {} ({} items, {} failed)",
                job.id,
                job.status.as_str(),
                job.items.len(),
                failed
            );
        }
        Commands::Jobs { slug, limit } => {
            status::print_jobs(&store, &slug, limit).await?;
        }
        Commands::Schedule { interval } => {
            let mut cfg = cfg.clone();
            if let Some(secs) = interval {
                if secs == 0 {
                    anyhow::bail!("--interval must be > 0");
                }
                cfg.schedule.tick_secs = secs;
            }
            let fetcher = Arc::new(HttpFetcher::new(&cfg)?);
            scheduler::run_scheduler(&cfg, &store, &registry, &notifier, fetcher).await?;
        }
    }

    Ok(())
}

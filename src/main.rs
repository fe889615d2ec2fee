use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use patent_harvest::collect::Session;
use patent_harvest::config::{find_config_file, get_config, load_config, Config, LOCAL_CONFIG_FILE};
use patent_harvest::extract::extract_biblio_envelopes;
use patent_harvest::models::{BiblioEnvelope, BiblioRecord};
use patent_harvest::ops::{
    ClientCredentials, CredentialManager, Credentials, HttpTransport, Retriever, TokioPause,
};
use patent_harvest::query::{load_nace_csv, KeywordTables, QueryBuilder, QueryPlan};
use patent_harvest::transform::{enrich_all, prep_patents, write_counts_csv, MIN_YEARS, PANEL_YEARS};
use patent_harvest::utils::{HttpClient, QueryProgress, RecordStore};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Patent Harvest - Collect patent data from the EPO Open Patent Services
#[derive(Parser, Debug)]
#[command(name = "patent-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collect patent data from the EPO Open Patent Services", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter configuration file
    Init {
        /// Where to write the file
        #[arg(default_value = LOCAL_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Build the query plan from the NACE table and reference settings
    #[command(alias = "q")]
    Queries {
        /// NACE codes CSV (defaults to paths.nace_codes_csv)
        #[arg(long)]
        nace: Option<PathBuf>,

        /// Write the plan to this file instead of a dated file in paths.queries_dir
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Run a query plan against the search service and store publication references
    Collect {
        /// Query plan file
        plan: PathBuf,

        /// Only these applicant countries (repeatable)
        #[arg(long)]
        country: Vec<String>,

        /// Result store (defaults to paths.store)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Run a query plan against the biblio service and store raw responses
    Biblio {
        /// Query plan file
        plan: PathBuf,

        /// Only these applicant countries (repeatable)
        #[arg(long)]
        country: Vec<String>,

        /// Response store (defaults to paths.biblio_store)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Flatten stored biblio responses into records
    Flatten {
        /// Output JSON file
        output: PathBuf,

        /// Biblio response store (defaults to paths.biblio_store)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Count patents per industry and year from stored biblio responses
    Counts {
        /// Biblio response store (defaults to paths.biblio_store)
        #[arg(long)]
        input: Option<PathBuf>,

        /// CSV output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// First year kept
        #[arg(long, default_value_t = *PANEL_YEARS.start())]
        from: i32,

        /// Last year kept
        #[arg(long, default_value_t = *PANEL_YEARS.end())]
        to: i32,

        /// Minimum number of distinct years per industry
        #[arg(long, default_value_t = MIN_YEARS)]
        min_years: usize,
    },

    /// Show the environment variables the tool reads
    Env,
}

fn print_env_vars() {
    println!("Patent Harvest - Environment Variables");
    println!();
    println!("OPS Credentials (required for collect and biblio):");
    println!("  ConsumerKey                 OPS consumer key");
    println!("  ConsumerSecretKey           OPS consumer secret");
    println!();
    println!("Configuration Overrides (section__key):");
    println!("  PATENT_HARVEST__OPS__PAGE_SIZE             Results per request (max 100)");
    println!("  PATENT_HARVEST__OPS__BASE_URL              OPS REST services root");
    println!("  PATENT_HARVEST__BACKOFF__START_SECS        First robot-detection wait (default: 10)");
    println!("  PATENT_HARVEST__BACKOFF__END_SECS          Longest robot-detection wait (default: 120)");
    println!("  PATENT_HARVEST__BACKOFF__STEPS             Number of backoff steps (default: 10)");
    println!("  PATENT_HARVEST__RETRIEVAL__MAX_ATTEMPTS    Give up on a range after this many requests");
    println!("  PATENT_HARVEST__RETRIEVAL__MAX_WAIT_SECS   Give up on a range after waiting this long");
    println!("  PATENT_HARVEST__PATHS__STORE               Search result store");
    println!();
    println!("Other Settings:");
    println!("  PATENT_HARVEST_USER_AGENT   Custom User-Agent header");
    println!("  RUST_LOG                    Rust logging level (e.g., debug, info, warn, error)");
    println!();
    println!("Example:");
    println!("  export ConsumerKey=\"your-key\"");
    println!("  export ConsumerSecretKey=\"your-secret\"");
    println!("  export PATENT_HARVEST__BACKOFF__STEPS=\"5\"");
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    let config = if let Some(config_path) = path {
        load_config(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else if let Some(config_path) = find_config_file() {
        tracing::info!("Using config file: {}", config_path.display());
        load_config(&config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        tracing::debug!("No config file found, using defaults");
        get_config()
    };
    config.validate()?;
    Ok(config)
}

/// Authenticate and assemble the retrieval state for one run.
async fn open_session(config: &Config) -> Result<Session<HttpTransport>> {
    let credentials = Credentials::from_env()?;

    let auth_client = HttpClient::with_timeout(config.ops.auth_timeout_secs)?;
    let exchange = ClientCredentials::with_url(auth_client, credentials, config.ops.auth_url.as_str());
    let manager = CredentialManager::acquire(exchange)
        .await
        .context("Failed to acquire an OPS access token")?;

    let client = HttpClient::with_timeout(config.ops.request_timeout_secs)?;
    let retriever = Retriever::new(
        HttpTransport::with_base_url(client, config.ops.base_url.as_str()),
        TokioPause,
    )
    .with_limits(config.retrieval.limits())
    .with_renew_delay(config.backoff.renew_delay());

    Ok(Session::new(
        retriever,
        manager,
        config.backoff.build(),
        config.ops.page_size,
    )?)
}

fn load_plan(path: &Path, countries: &[String]) -> Result<QueryPlan> {
    let mut plan = QueryPlan::load(path)
        .with_context(|| format!("Failed to read query plan {}", path.display()))?;
    plan.retain_countries(countries);
    if plan.is_empty() {
        bail!("Query plan {} has no queries to run", path.display());
    }
    Ok(plan)
}

fn load_biblio_records(path: &Path) -> Result<Vec<BiblioRecord>> {
    let envelopes: Vec<BiblioEnvelope> = RecordStore::new(path)
        .load()
        .with_context(|| format!("Failed to read biblio store {}", path.display()))?;
    Ok(extract_biblio_envelopes(&envelopes)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("patent_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Env => {
            print_env_vars();
        }

        Commands::Init { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::example().save(&path)?;
            if !cli.quiet {
                println!("Wrote {}", path.display());
            }
        }

        Commands::Queries { nace, output } => {
            let config = resolve_config(cli.config.as_deref())?;
            let nace_path = nace.unwrap_or_else(|| config.paths.nace_codes_csv.clone());
            let activities = load_nace_csv(&nace_path)
                .with_context(|| format!("Failed to read NACE codes {}", nace_path.display()))?;

            let tables = KeywordTables::build(&config.reference.industries(), &activities);
            let plan = QueryBuilder::new(config.reference.cpc_codes(), config.reference.country_codes())
                .build(&tables);

            let path = match output {
                Some(path) => {
                    plan.save_as(&path)?;
                    path
                }
                None => plan.save(&config.paths.queries_dir)?,
            };
            if !cli.quiet {
                println!("Wrote {} queries to {}", plan.len(), path.display());
            }
        }

        Commands::Collect {
            plan,
            country,
            store,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            let plan = load_plan(&plan, &country)?;
            let store = RecordStore::new(store.unwrap_or_else(|| config.paths.store.clone()));

            let mut session = open_session(&config).await?;
            let progress = QueryProgress::new(plan.len() as u64, "Searching", cli.quiet);
            let summary = session.collect_search(&plan, &store, &progress).await?;
            progress.finish(format!("{} records", summary.records));

            if !cli.quiet {
                println!(
                    "{} queries, {} pages, {} records ({} without results, {} skipped) -> {}",
                    summary.queries,
                    summary.pages,
                    summary.records,
                    summary.empty,
                    summary.skipped,
                    store.path().display()
                );
            }
        }

        Commands::Biblio {
            plan,
            country,
            store,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            let plan = load_plan(&plan, &country)?;
            let store = RecordStore::new(store.unwrap_or_else(|| config.paths.biblio_store.clone()));

            let mut session = open_session(&config).await?;
            let progress = QueryProgress::new(plan.len() as u64, "Fetching biblio", cli.quiet);
            let summary = session.collect_biblio(&plan, &store, &progress).await?;
            progress.finish(format!("{} pages", summary.pages));

            if !cli.quiet {
                println!(
                    "{} queries, {} pages ({} without results, {} skipped) -> {}",
                    summary.queries,
                    summary.pages,
                    summary.empty,
                    summary.skipped,
                    store.path().display()
                );
            }
        }

        Commands::Flatten { output, input } => {
            let config = resolve_config(cli.config.as_deref())?;
            let input = input.unwrap_or_else(|| config.paths.biblio_store.clone());
            let records = load_biblio_records(&input)?;

            let count = records.len();
            std::fs::write(&output, serde_json::to_string_pretty(&records)?)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if !cli.quiet {
                println!("Wrote {} records to {}", count, output.display());
            }
        }

        Commands::Counts {
            input,
            output,
            from,
            to,
            min_years,
        } => {
            if to < from {
                bail!("--to ({}) must not precede --from ({})", to, from);
            }
            let config = resolve_config(cli.config.as_deref())?;
            let input = input.unwrap_or_else(|| config.paths.biblio_store.clone());

            let rows = enrich_all(&load_biblio_records(&input)?);
            let counts = prep_patents(&rows, from..=to, min_years);
            tracing::info!("{} patents -> {} industry-year counts", rows.len(), counts.len());

            match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_counts_csv(file, &counts)?;
                    if !cli.quiet {
                        println!("Wrote {} rows to {}", counts.len(), path.display());
                    }
                }
                None => write_counts_csv(std::io::stdout().lock(), &counts)?,
            }
        }
    }

    Ok(())
}

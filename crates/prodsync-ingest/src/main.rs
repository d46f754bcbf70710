//! prodsync-ingest - product fetch-and-persist tool

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use prodsync_common::logging::{init_logging, LogConfig, LogLevel, LogOutput, LoggingGuard};
use prodsync_ingest::config::{DEFAULT_CONFIG_FILE, DEFAULT_DB_SECTION};
use prodsync_ingest::{
    ApiClient, AppConfig, IdSource, IngestSummary, IngestionPipeline, JsonlFailureLog,
    PgRecordStore, PipelineOptions,
};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "prodsync-ingest")]
#[command(author, version, about = "Fetch product details into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every id in the input file and store the results
    Run(RunArgs),

    /// Create or upgrade the products table
    Migrate(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// INI file holding the database settings
    #[arg(short, long, env = "PRODSYNC_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Section of the INI file with the database keys
    #[arg(short, long, default_value = DEFAULT_DB_SECTION)]
    section: String,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// CSV file of product ids
    #[arg(short, long, default_value = "product_id.csv")]
    input: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// JSON Lines file for failed ids
    #[arg(long)]
    failure_log: Option<PathBuf>,

    /// Product URL template containing `{id}`
    #[arg(long)]
    endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Fetch attempts per id for transient failures
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Stop after this many ids
    #[arg(long)]
    limit: Option<usize>,

    /// Strip markup and normalise name and description
    #[arg(long)]
    clean_text: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl RunArgs {
    /// Command-line flags take precedence over the configuration file
    fn apply(&self, config: &mut AppConfig) {
        if let Some(path) = &self.failure_log {
            config.ingest.failure_log = path.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.api.endpoint = endpoint.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.api.timeout_secs = timeout;
        }
        if let Some(attempts) = self.max_attempts {
            config.ingest.max_attempts = attempts;
        }
        if self.clean_text {
            config.api.clean_text = true;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("prodsync-ingest")
        .build();
    let log_config = match log_config.clone().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring invalid logging environment: {e:#}");
            log_config
        },
    };

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        },
    };

    let result = match cli.command {
        Command::Run(args) => run(args).await.map(|summary| println!("{summary}")),
        Command::Migrate(args) => migrate(args).await,
    };

    let code = report(result, guard);
    if code != 0 {
        process::exit(code);
    }
}

/// Report the command result and release logging, returning the exit code
fn report(result: Result<()>, guard: Option<LoggingGuard>) -> i32 {
    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            1
        },
    };

    // process::exit skips destructors; flush buffered file output first
    drop(guard);
    code
}

async fn run(args: RunArgs) -> Result<IngestSummary> {
    let mut config = AppConfig::load(&args.config.config, &args.config.section)?;
    args.apply(&mut config);
    config.validate()?;

    let ids = IdSource::open(&args.input)?;
    let client = ApiClient::new(&config.api)?;
    let failures = JsonlFailureLog::open(&config.ingest.failure_log).with_context(|| {
        format!("cannot open failure log '{}'", config.ingest.failure_log.display())
    })?;

    info!(
        input = %ids.path().display(),
        column = %ids.column_name(),
        endpoint = %client.endpoint(),
        failure_log = %failures.path().display(),
        "Starting prodsync ingestion"
    );

    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let total = ids.count()?;
        create_progress_bar(args.limit.map_or(total, |limit| limit.min(total)) as u64)
    };

    let options = PipelineOptions {
        max_attempts: config.ingest.max_attempts,
        retry_backoff: Duration::from_millis(config.ingest.retry_backoff_ms),
        limit: args.limit,
    };

    let store = PgRecordStore::connect(&config.database).await?;
    let result = ingest(&store, &client, &failures, &ids, options, progress).await;
    store.close().await;

    Ok(result?)
}

async fn ingest(
    store: &PgRecordStore,
    client: &ApiClient,
    failures: &JsonlFailureLog,
    ids: &IdSource,
    options: PipelineOptions,
    progress: ProgressBar,
) -> prodsync_ingest::Result<IngestSummary> {
    store.migrate().await?;

    let pipeline =
        IngestionPipeline::new(client, store, failures, options).with_progress(progress);
    let summary = pipeline.run(ids.iter()?).await?;

    let stored_total = store.count().await?;
    info!(stored_total, "Products in store after run");

    Ok(summary)
}

async fn migrate(args: ConfigArgs) -> Result<()> {
    let config = AppConfig::load(&args.config, &args.section)?;
    let store = PgRecordStore::connect(&config.database).await?;

    let result = store.migrate().await;
    store.close().await;
    result.context("failed to apply migrations")?;

    info!(database = %config.database.database, "Migrations applied");
    Ok(())
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

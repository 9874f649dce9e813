//! Rulings Crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use rulings_crawler::{
    config::{load_config, load_partitions, parse_years},
    error::{AppError, Result},
    models::Config,
    pipeline::{self, CrawlOptions},
    services::HttpSource,
    storage::RecordSink,
};

/// Crawl year-partitioned rulings and laws into size-bounded chunks
#[derive(Parser, Debug)]
#[command(
    name = "rulings-crawler",
    version,
    about = "Year-partitioned rulings and laws crawler"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Output directory (overrides output.dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every configured year, then rebuild the index
    Crawl {
        /// Continue after chunks written by an earlier run
        #[arg(long)]
        resume: bool,

        /// Comma-separated years (overrides [partitions])
        #[arg(long)]
        years: Option<String>,
    },

    /// Rebuild index.json, index.html and chunk views from chunk files
    Index,

    /// Replay chunk records into the relational sink
    Load,

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[cfg(feature = "sqlite")]
fn open_sink(config: &Config) -> Result<Arc<dyn RecordSink>> {
    let sink = rulings_crawler::storage::SqliteSink::open(&config.sink.database, config.source.kind)?;
    log::info!("Record sink: {}", config.sink.database.display());
    Ok(Arc::new(sink))
}

#[cfg(not(feature = "sqlite"))]
fn open_sink(_config: &Config) -> Result<Arc<dyn RecordSink>> {
    Err(AppError::config(
        "this build has no record sink; enable the `sqlite` feature",
    ))
}

/// Set the shutdown flag on Ctrl-C.
fn watch_interrupt() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; finishing in-flight items");
            flag.store(true, Ordering::SeqCst);
        }
    });
    shutdown
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(&cli.config)?;
    if let Some(output) = cli.output {
        config.output.dir = output;
    }
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Crawl { resume, years } => {
            if let Some(years) = years {
                config.partitions.years = parse_years(&years)?;
                config.partitions.years_file = None;
            }
            config.validate()?;
            let partitions = load_partitions(&config.partitions)?;

            let source = Arc::new(HttpSource::new(&config.crawler, config.source.profile())?);
            let sink = if config.sink.enabled {
                Some(open_sink(&config)?)
            } else {
                None
            };
            let options = CrawlOptions {
                resume,
                shutdown: watch_interrupt(),
            };

            let report = pipeline::run_crawler(&config, source, sink, &partitions, options).await?;
            log::info!(
                "Crawl complete: {} records indexed in {}",
                report.index.record_count(),
                config.output.dir.display()
            );
        }

        Command::Index => {
            let index = pipeline::rebuild_index(
                &config.output.dir,
                &config.output.file_prefix,
                &config.source.profile(),
            )
            .await?;
            log::info!(
                "Indexed {} records from {} chunks",
                index.record_count(),
                index.chunks.len()
            );
        }

        Command::Load => {
            let sink = open_sink(&config)?;
            let stats = pipeline::run_load(&config, sink.as_ref()).await?;
            if stats.failed_batches > 0 {
                return Err(AppError::sink(format!(
                    "{} of {} chunk batches failed",
                    stats.failed_batches, stats.chunks
                )));
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            let partitions = load_partitions(&config.partitions)?;
            log::info!(
                "✓ Config OK ({} source, {} partitions)",
                config.source.kind.name(),
                partitions.len()
            );
        }
    }

    Ok(())
}

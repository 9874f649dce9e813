// src/pipeline/crawl.rs

//! Record crawling pipeline.
//!
//! Partition Enumerator -> Pagination Walker -> Bounded Fetch Pool ->
//! Chunk Writer, then the index is rebuilt from the chunks on disk.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlStats, Partition};
use crate::pipeline::dedup::DedupGuard;
use crate::pipeline::enumerate::first_requests;
use crate::pipeline::index::{RecordIndex, rebuild_index, scan_index};
use crate::pipeline::pool::FetchPool;
use crate::pipeline::walker::Walker;
use crate::services::PageSource;
use crate::storage::{ChunkWriter, RecordSink, WriterSummary};
use crate::utils::log::{header, step, summary};

/// Run-time switches that are not part of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Continue after chunks written by an earlier run
    pub resume: bool,
    /// Set to stop walks before their next listing request
    pub shutdown: Arc<AtomicBool>,
}

/// Result of a finished crawl.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub stats: CrawlStats,
    pub written: WriterSummary,
    pub index: RecordIndex,
}

/// Run the record crawler over `partitions`.
pub async fn run_crawler(
    config: &Config,
    source: Arc<dyn PageSource>,
    sink: Option<Arc<dyn RecordSink>>,
    partitions: &[Partition],
    options: CrawlOptions,
) -> Result<CrawlReport> {
    let start_time = Utc::now();
    let profile = config.source.profile();
    let dir = config.output.dir.as_path();
    let prefix = config.output.file_prefix.as_str();

    header(&format!("Crawling {} ({} partitions)", profile.kind.name(), partitions.len()));

    tokio::fs::create_dir_all(dir).await?;

    step(1, 3, "Scanning existing chunks");
    let existing = scan_index(dir, prefix).await?;
    let (items, first_index) = match existing.max_chunk_index() {
        Some(_) if !options.resume => {
            return Err(AppError::config(format!(
                "{} already holds {} chunks; use --resume to continue or choose another output directory",
                dir.display(),
                existing.chunks.len()
            )));
        }
        Some(max) => {
            log::info!(
                "Resuming after {} records in {} chunks",
                existing.record_count(),
                existing.chunks.len()
            );
            let seen = existing.item_ids().map(|id| id.as_str().to_string());
            (DedupGuard::with_seen(seen), max + 1)
        }
        None => (DedupGuard::new(), 1),
    };

    let writer = Arc::new(ChunkWriter::new(
        dir,
        prefix,
        config.output.chunk_threshold_bytes,
        first_index,
    ));
    let pool = FetchPool::new(config.crawler.max_concurrent, Arc::clone(&source), Arc::clone(&writer));
    let mut walker = Walker::new(
        source,
        pool,
        profile.clone(),
        Arc::new(items),
        Arc::clone(&options.shutdown),
    )
    .with_request_delay(Duration::from_millis(config.crawler.request_delay_ms));
    if let Some(sink) = sink {
        walker = walker.with_sink(sink);
    }

    step(2, 3, "Walking listing pages");
    let mut stats = CrawlStats::default();
    let mut fatal = None;
    {
        let walker = &walker;
        let mut walks = stream::iter(first_requests(&profile, partitions))
            .map(|request| async move { walker.walk(request).await })
            .buffer_unordered(config.crawler.partition_concurrency.max(1));

        while let Some(result) = walks.next().await {
            match result {
                Ok(walk) => stats.merge(&walk),
                Err(e) => {
                    log::error!("Crawl halted: {}", e);
                    options.shutdown.store(true, Ordering::SeqCst);
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }
    }

    let finished = writer.finish().await;
    if let Some(e) = fatal {
        if let Err(finish_err) = finished {
            log::error!("Closing the open chunk also failed: {}", finish_err);
        }
        return Err(e);
    }
    let written = finished?;

    step(3, 3, "Rebuilding index");
    let index = rebuild_index(dir, prefix, &profile).await?;

    let elapsed = Utc::now() - start_time;
    summary(
        "Crawl",
        &[
            ("Partitions", stats.partitions.to_string()),
            (
                "Listing pages",
                format!("{} ({} failed)", stats.listing_pages, stats.listing_failures),
            ),
            (
                "Items",
                format!(
                    "{} admitted, {} written, {} dropped, {} duplicates",
                    stats.items_admitted, stats.items_written, stats.items_dropped, stats.items_duplicate
                ),
            ),
            (
                "Chunks",
                format!("{} new ({} bytes)", written.chunks.len(), written.bytes),
            ),
            ("Indexed records", index.record_count().to_string()),
            ("Sink failures", stats.sink_failures.to_string()),
            ("Elapsed", format!("{}s", elapsed.num_seconds())),
        ],
    );
    if options.shutdown.load(Ordering::SeqCst) {
        log::warn!("Crawl was interrupted; run again with --resume to continue");
    }

    Ok(CrawlReport {
        stats,
        written,
        index,
    })
}

// src/pipeline/walker.rs

//! Pagination walker.
//!
//! Walks one partition's listing pages strictly in order:
//!
//! ```text
//! UNSTARTED -> WALKING(1) -> WALKING(2) -> ... -> DONE
//! ```
//!
//! Page `n + 1` is requested only after every item on page `n` has been
//! admitted to the fetch pool and the page's batch has drained.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::Result;
use crate::models::{CrawlStats, ListingPage, ListingRequest, Partition, SourceProfile};
use crate::pipeline::dedup::DedupGuard;
use crate::pipeline::enumerate::listing_request;
use crate::pipeline::pool::FetchPool;
use crate::services::PageSource;
use crate::storage::RecordSink;

/// State of one partition walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Unstarted,
    /// Next page to request, plus the highest page number seen so far
    Walking { page: u32, known_max: u32 },
    Done,
}

/// Whether another page follows `page` given the highest page number
/// advertised so far. The final advertised page is always fetched.
pub fn has_next_page(page: u32, max_page_number: u32) -> bool {
    page < max_page_number
}

/// Everything a walk shares with the other walks of a crawl.
pub struct Walker {
    source: Arc<dyn PageSource>,
    pool: FetchPool,
    profile: SourceProfile,
    listings: DedupGuard,
    items: Arc<DedupGuard>,
    sink: Option<Arc<dyn RecordSink>>,
    request_delay: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Walker {
    pub fn new(
        source: Arc<dyn PageSource>,
        pool: FetchPool,
        profile: SourceProfile,
        items: Arc<DedupGuard>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            pool,
            profile,
            listings: DedupGuard::new(),
            items,
            sink: None,
            request_delay: Duration::ZERO,
            shutdown,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Walk every listing page of a partition, starting from its first
    /// request.
    ///
    /// Only fatal errors (chunk I/O) are returned; fetch and parse failures
    /// are counted in the stats.
    pub async fn walk(&self, first: ListingRequest) -> Result<CrawlStats> {
        let partition = first.partition;
        let mut stats = CrawlStats {
            partitions: 1,
            ..CrawlStats::default()
        };
        log::info!("Walking partition {}", partition);

        let mut state = WalkState::Unstarted;
        loop {
            state = match state {
                WalkState::Unstarted => WalkState::Walking {
                    page: first.page_number,
                    known_max: first.page_number,
                },
                WalkState::Walking { page, known_max } => {
                    self.step(partition, page, known_max, &mut stats).await?
                }
                WalkState::Done => break,
            };
        }

        log::info!(
            "Partition {} done: {} pages, {} items written, {} dropped",
            partition,
            stats.listing_pages,
            stats.items_written,
            stats.items_dropped
        );
        Ok(stats)
    }

    async fn step(
        &self,
        partition: Partition,
        page: u32,
        known_max: u32,
        stats: &mut CrawlStats,
    ) -> Result<WalkState> {
        if self.stopping() {
            log::info!("Shutdown requested; partition {} stops before page {}", partition, page);
            return Ok(WalkState::Done);
        }

        let request = listing_request(&self.profile, partition, page);
        if !self.listings.admit(&request.url) {
            stats.listing_duplicates += 1;
            log::debug!("Listing page already visited: {}", request.url);
            return Ok(WalkState::Done);
        }

        if page > 1 && !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let listing = match self.source.fetch_listing(&request).await {
            Ok(listing) => listing,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                stats.listing_failures += 1;
                log::warn!("Listing page {} of {} failed: {}", page, partition, e);
                return Ok(if has_next_page(page, known_max) {
                    WalkState::Walking {
                        page: page + 1,
                        known_max,
                    }
                } else {
                    WalkState::Done
                });
            }
        };
        stats.listing_pages += 1;

        if page == 1 && listing.item_links.is_empty() {
            log::info!("Partition {} has no items", partition);
            return Ok(WalkState::Done);
        }

        self.fetch_items(partition, &listing, stats).await?;

        // A page may show a shorter pager (or none); the maximum only grows.
        let max = known_max.max(listing.max_page_number());
        log::debug!("Partition {} page {}/{}", partition, page, max);
        if has_next_page(page, max) {
            Ok(WalkState::Walking {
                page: page + 1,
                known_max: max,
            })
        } else {
            Ok(WalkState::Done)
        }
    }

    /// Admit the page's items, drain the batch and hand written items to the
    /// sink.
    async fn fetch_items(
        &self,
        partition: Partition,
        listing: &ListingPage,
        stats: &mut CrawlStats,
    ) -> Result<()> {
        let mut batch = self.pool.batch();
        for link in &listing.item_links {
            if self.stopping() {
                break;
            }
            if !self.items.admit(link.id.as_str()) {
                stats.items_duplicate += 1;
                continue;
            }
            stats.items_admitted += 1;
            batch.submit(link.clone(), partition).await?;
        }

        let outcome = batch.drain().await?;
        stats.items_written += outcome.written.len();
        stats.items_dropped += outcome.dropped;

        if let Some(sink) = &self.sink {
            if !outcome.written.is_empty() {
                if let Err(e) = sink.persist(&outcome.written).await {
                    stats.sink_failures += 1;
                    log::warn!("Sink failed for partition {}: {}", partition, e);
                }
            }
        }
        Ok(())
    }
}

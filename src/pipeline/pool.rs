// src/pipeline/pool.rs

//! Bounded fetch pool.
//!
//! One semaphore caps outstanding detail fetches across the whole crawl.
//! Each listing page gets its own [`FetchBatch`], which the walker drains
//! before deciding whether to request the next page.
//!
//! A fatal error cancels the batch's outstanding fetches. A worker that has
//! started appending always finishes its record, so chunks never hold a
//! partial record.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

use crate::error::{AppError, Result};
use crate::models::{Item, ItemLink, Partition};
use crate::services::PageSource;
use crate::storage::ChunkWriter;

/// One-shot cancellation signal shared by a batch's workers.
#[derive(Default)]
struct Cancel {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancel {
    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        // Register before checking the flag so a concurrent cancel is not missed.
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Shared worker slots, page source and chunk writer.
#[derive(Clone)]
pub struct FetchPool {
    slots: Arc<Semaphore>,
    source: Arc<dyn PageSource>,
    writer: Arc<ChunkWriter>,
}

/// What one drained batch produced.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Items written to chunks, in completion order
    pub written: Vec<Item>,
    pub dropped: usize,
}

impl FetchPool {
    pub fn new(max_concurrent: usize, source: Arc<dyn PageSource>, writer: Arc<ChunkWriter>) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            source,
            writer,
        }
    }

    /// Start an empty batch for one listing page.
    pub fn batch(&self) -> FetchBatch {
        FetchBatch {
            pool: self.clone(),
            tasks: JoinSet::new(),
            cancel: Arc::new(Cancel::default()),
        }
    }

    /// Slots not currently held by a worker.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

/// Submissions made for one listing page.
pub struct FetchBatch {
    pool: FetchPool,
    tasks: JoinSet<Result<Option<Item>>>,
    cancel: Arc<Cancel>,
}

impl FetchBatch {
    /// Hand one item link to the pool. Waits while every slot is taken.
    pub async fn submit(&mut self, link: ItemLink, partition: Partition) -> Result<()> {
        let permit = Arc::clone(&self.pool.slots)
            .acquire_owned()
            .await
            .map_err(|e| AppError::Task(e.to_string()))?;
        let source = Arc::clone(&self.pool.source);
        let writer = Arc::clone(&self.pool.writer);
        let cancel = Arc::clone(&self.cancel);

        self.tasks.spawn(async move {
            let _permit = permit;
            let fetched = tokio::select! {
                fetched = source.fetch_detail(&link, partition) => fetched,
                _ = cancel.cancelled() => return Ok(None),
            };
            let item = match fetched {
                Ok(item) => item,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Dropping item {} ({}): {}", link.id, link.url, e);
                    return Ok(None);
                }
            };
            if cancel.is_cancelled() {
                return Ok(None);
            }
            writer.append(&item).await?;
            Ok(Some(item))
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every submission to finish.
    ///
    /// A fatal failure cancels fetches still in flight and is returned once
    /// every worker has stopped. Appends already under way complete.
    pub async fn drain(mut self) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut fatal = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(Some(item))) => outcome.written.push(item),
                Ok(Ok(None)) => outcome.dropped += 1,
                Ok(Err(e)) => {
                    log::error!("Fetch worker failed: {}", e);
                    if fatal.is_none() {
                        self.cancel.cancel();
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    log::error!("Fetch worker panicked: {}", e);
                    if fatal.is_none() {
                        self.cancel.cancel();
                        fatal = Some(AppError::Task(e.to_string()));
                    }
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemId, ListingPage, ListingRequest};
    use crate::storage::{list_chunks, read_chunk};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Detail source that fails for ids starting with "bad" and tracks
    /// peak concurrency.
    #[derive(Default)]
    struct SlowSource {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for SlowSource {
        async fn fetch_listing(&self, _request: &ListingRequest) -> Result<ListingPage> {
            Ok(ListingPage::default())
        }

        async fn fetch_detail(&self, link: &ItemLink, partition: Partition) -> Result<Item> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if link.id.as_str() == "disk" {
                return Err(AppError::Io(std::io::Error::other("disk full")));
            }
            if link.id.as_str() == "slow" {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if link.id.as_str().starts_with("bad") {
                return Err(AppError::parse(&link.url, "missing required field 'court'"));
            }
            Ok(Item::new(link.id.clone(), partition, &link.url).with_field("court", "x"))
        }
    }

    fn link(id: &str) -> ItemLink {
        ItemLink {
            id: ItemId::new(id),
            url: format!("https://example.com/{id}"),
        }
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let tmp = TempDir::new().unwrap();
        let source = Arc::new(SlowSource::default());
        let writer = Arc::new(ChunkWriter::new(tmp.path(), "rulings", 1 << 20, 1));
        let pool = FetchPool::new(3, source.clone(), writer.clone());

        let mut batch = pool.batch();
        for n in 0..12 {
            batch.submit(link(&n.to_string()), Partition(2020)).await.unwrap();
        }
        let outcome = batch.drain().await.unwrap();
        writer.finish().await.unwrap();

        assert_eq!(outcome.written.len(), 12);
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.available(), 3);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_dropped_without_record() {
        let tmp = TempDir::new().unwrap();
        let source = Arc::new(SlowSource::default());
        let writer = Arc::new(ChunkWriter::new(tmp.path(), "rulings", 1 << 20, 1));
        let pool = FetchPool::new(2, source, writer.clone());

        let mut batch = pool.batch();
        for id in ["1", "bad-2", "3"] {
            batch.submit(link(id), Partition(2020)).await.unwrap();
        }
        let outcome = batch.drain().await.unwrap();
        let summary = writer.finish().await.unwrap();

        assert_eq!(outcome.written.len(), 2);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(summary.records, 2);
        assert_eq!(list_chunks(tmp.path(), "rulings").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_drains_immediately() {
        let tmp = TempDir::new().unwrap();
        let writer = Arc::new(ChunkWriter::new(tmp.path(), "rulings", 100, 1));
        let pool = FetchPool::new(1, Arc::new(SlowSource::default()), writer);
        let batch = pool.batch();
        assert!(batch.is_empty());
        let outcome = batch.drain().await.unwrap();
        assert!(outcome.written.is_empty());
    }

    #[tokio::test]
    async fn test_fatal_error_cancels_pending_fetches() {
        let tmp = TempDir::new().unwrap();
        let writer = Arc::new(ChunkWriter::new(tmp.path(), "rulings", 1 << 20, 1));
        let pool = FetchPool::new(3, Arc::new(SlowSource::default()), writer.clone());

        let mut batch = pool.batch();
        for id in ["slow", "1", "disk"] {
            batch.submit(link(id), Partition(2020)).await.unwrap();
        }
        let started = std::time::Instant::now();
        let err = batch.drain().await.unwrap_err();
        let summary = writer.finish().await.unwrap();

        assert!(matches!(err, AppError::Io(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(summary.records <= 1);
        assert_eq!(pool.available(), 3);
        for chunk in list_chunks(tmp.path(), "rulings").await.unwrap() {
            let scan = read_chunk(&chunk.path).await.unwrap();
            assert_eq!(scan.truncated_at, None);
            assert!(scan.records.iter().all(|r| r.marker.item_id.as_str() != "slow"));
        }
    }
}

// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod item;
mod source;

// Re-export all public types
pub use config::{Config, CrawlerConfig, OutputConfig, PartitionConfig, SinkConfig, SourceConfig};
pub use item::{Field, Item, ItemId, ItemLink, ListingPage, ListingRequest, Partition};
pub use source::{ArticlesProfile, Extract, FieldSelector, SourceKind, SourceProfile};

/// Counters collected over a crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CrawlStats {
    pub partitions: usize,
    pub listing_pages: usize,
    pub listing_failures: usize,
    pub listing_duplicates: usize,
    pub items_admitted: usize,
    pub items_duplicate: usize,
    pub items_written: usize,
    pub items_dropped: usize,
    pub sink_failures: usize,
}

impl CrawlStats {
    /// Fold the counters of another walk into this one.
    pub fn merge(&mut self, other: &CrawlStats) {
        self.partitions += other.partitions;
        self.listing_pages += other.listing_pages;
        self.listing_failures += other.listing_failures;
        self.listing_duplicates += other.listing_duplicates;
        self.items_admitted += other.items_admitted;
        self.items_duplicate += other.items_duplicate;
        self.items_written += other.items_written;
        self.items_dropped += other.items_dropped;
        self.sink_failures += other.sink_failures;
    }
}

//! Pipeline entry points for crawler operations.
//!
//! - `run_crawler`: Walk partitions, fetch items into chunks, rebuild the index
//! - `rebuild_index`: Regenerate the index and chunk views from chunk files
//! - `run_load`: Replay chunk records into the relational sink

pub mod crawl;
pub mod dedup;
pub mod enumerate;
pub mod index;
pub mod load;
pub mod pool;
pub mod walker;

pub use crawl::{CrawlOptions, CrawlReport, run_crawler};
pub use dedup::DedupGuard;
pub use index::{RecordIndex, rebuild_index, scan_index};
pub use load::{LoadStats, run_load};

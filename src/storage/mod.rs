//! Storage for crawled records.
//!
//! Chunk files are the single source of truth; everything else in the
//! output directory is derived from them.
//!
//! ## Directory Structure
//!
//! ```text
//! output/
//! ├── rulings_0001_2020-2020.chunk   # closed chunk (marker + JSON payloads)
//! ├── rulings_0002.chunk             # chunk still open (or left by a crash)
//! ├── rulings_0001_2020-2020.html    # rendered view of a chunk
//! ├── index.html                     # navigable index
//! └── index.json                     # machine-readable index
//! ```

pub mod chunk;
pub mod sink;
pub mod writer;

use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::Result;

// Re-export for convenience
pub use chunk::{ChunkFile, ChunkScan, RecordMarker, list_chunks, read_chunk};
#[cfg(feature = "sqlite")]
pub use sink::SqliteSink;
pub use sink::RecordSink;
pub use writer::{ChunkSummary, ChunkWriter, WriterSummary};

/// Write bytes atomically (write to temp, then rename).
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("index.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
        assert!(!path.with_extension("tmp").exists());
    }
}

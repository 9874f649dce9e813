//! Size-bounded chunk writer.
//!
//! All fetch workers funnel through [`ChunkWriter::append`], which holds one
//! async mutex for the duration of a single record write. Rotation happens
//! before a write: if the record would push a non-empty chunk past the
//! threshold, the chunk is closed and the next index is opened. The first
//! record of a chunk is always written, so an oversized record lands whole.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{Item, Partition};
use crate::storage::chunk::{closed_chunk_name, encode_record, open_chunk_name};

/// Where a record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub chunk_index: u32,
    pub bytes: u64,
}

/// A closed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub index: u32,
    pub path: PathBuf,
    pub records: usize,
    pub bytes: u64,
}

/// Totals returned by [`ChunkWriter::finish`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterSummary {
    pub chunks: Vec<ChunkSummary>,
    pub records: usize,
    pub bytes: u64,
}

struct OpenChunk {
    index: u32,
    path: PathBuf,
    file: File,
    size: u64,
    records: usize,
}

struct WriterState {
    current: Option<OpenChunk>,
    next_index: u32,
    /// Chunk index -> partitions it holds (only used for file names)
    partitions: BTreeMap<u32, BTreeSet<Partition>>,
    closed: Vec<ChunkSummary>,
    records: usize,
    bytes: u64,
}

/// Single-writer, append-only chunk sink.
pub struct ChunkWriter {
    dir: PathBuf,
    prefix: String,
    threshold: u64,
    state: Mutex<WriterState>,
}

impl ChunkWriter {
    /// Create a writer whose first chunk will be `first_index`.
    ///
    /// No file is created until the first append.
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        threshold: u64,
        first_index: u32,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            threshold,
            state: Mutex::new(WriterState {
                current: None,
                next_index: first_index.max(1),
                partitions: BTreeMap::new(),
                closed: Vec::new(),
                records: 0,
                bytes: 0,
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one item as a framed record.
    ///
    /// I/O errors are returned as-is; the caller must treat them as fatal.
    pub async fn append(&self, item: &Item) -> Result<AppendOutcome> {
        let bytes = encode_record(item)?;
        let len = bytes.len() as u64;

        let mut state = self.state.lock().await;

        let must_rotate = state
            .current
            .as_ref()
            .is_some_and(|open| open.records > 0 && open.size + len > self.threshold);
        if must_rotate {
            self.close_current(&mut state).await?;
        }
        let open = match state.current.take() {
            Some(open) => open,
            None => {
                let index = state.next_index;
                let open = self.open_chunk(index).await?;
                state.next_index = index + 1;
                open
            }
        };
        let open = state.current.insert(open);
        open.file.write_all(&bytes).await?;
        open.size += len;
        open.records += 1;
        let chunk_index = open.index;

        state
            .partitions
            .entry(chunk_index)
            .or_default()
            .insert(item.partition);
        state.records += 1;
        state.bytes += len;

        Ok(AppendOutcome {
            chunk_index,
            bytes: len,
        })
    }

    /// Close the open chunk and return totals for this writer.
    pub async fn finish(&self) -> Result<WriterSummary> {
        let mut state = self.state.lock().await;
        self.close_current(&mut state).await?;
        Ok(WriterSummary {
            chunks: state.closed.clone(),
            records: state.records,
            bytes: state.bytes,
        })
    }

    async fn open_chunk(&self, index: u32) -> Result<OpenChunk> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(open_chunk_name(&self.prefix, index));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        log::debug!("Opened chunk {}", path.display());
        Ok(OpenChunk {
            index,
            path,
            file,
            size: 0,
            records: 0,
        })
    }

    async fn close_current(&self, state: &mut WriterState) -> Result<()> {
        let Some(mut open) = state.current.take() else {
            return Ok(());
        };
        open.file.flush().await?;
        open.file.sync_all().await?;
        drop(open.file);

        let range = state.partitions.get(&open.index).and_then(|set| {
            let first = set.first()?;
            let last = set.last()?;
            Some((*first, *last))
        });
        let closed_path = self
            .dir
            .join(closed_chunk_name(&self.prefix, open.index, range));
        if closed_path != open.path {
            tokio::fs::rename(&open.path, &closed_path).await?;
        }

        log::info!(
            "Closed chunk {} ({} records, {} bytes)",
            closed_path.display(),
            open.records,
            open.size
        );
        state.closed.push(ChunkSummary {
            index: open.index,
            path: closed_path,
            records: open.records,
            bytes: open.size,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemId;
    use crate::storage::chunk::{encode_record, list_chunks, read_chunk};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn item(id: &str, year: i32) -> Item {
        Item::new(ItemId::new(id), Partition(year), format!("https://example.com/{id}"))
            .with_field("number", id)
    }

    fn record_len(item: &Item) -> u64 {
        encode_record(item).unwrap().len() as u64
    }

    #[tokio::test]
    async fn test_no_file_without_records() {
        let tmp = TempDir::new().unwrap();
        let writer = ChunkWriter::new(tmp.path(), "rulings", 100, 1);
        let summary = writer.finish().await.unwrap();
        assert!(summary.chunks.is_empty());
        assert!(list_chunks(tmp.path(), "rulings").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rotation_before_exceeding_threshold() {
        let tmp = TempDir::new().unwrap();
        // Same-width ids give records of identical size.
        let items = [
            item("11", 2020),
            item("12", 2020),
            item("13", 2020),
            item("21", 2021),
            item("22", 2021),
        ];
        let len = record_len(&items[0]);
        assert!(items.iter().all(|i| record_len(i) == len));

        // Room for two records but not three.
        let threshold = len * 5 / 2;
        let writer = ChunkWriter::new(tmp.path(), "rulings", threshold, 1);
        let mut landed = Vec::new();
        for i in &items {
            landed.push(writer.append(i).await.unwrap().chunk_index);
        }
        let summary = writer.finish().await.unwrap();

        assert_eq!(landed, vec![1, 1, 2, 2, 3]);
        assert_eq!(summary.records, 5);
        let names: Vec<String> = summary
            .chunks
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "rulings_0001_2020-2020.chunk",
                "rulings_0002_2020-2021.chunk",
                "rulings_0003_2021-2021.chunk",
            ]
        );
        for chunk in &summary.chunks {
            assert!(chunk.bytes <= threshold);
            let on_disk = tokio::fs::metadata(&chunk.path).await.unwrap().len();
            assert_eq!(on_disk, chunk.bytes);
        }
    }

    #[tokio::test]
    async fn test_oversized_record_lands_whole() {
        let tmp = TempDir::new().unwrap();
        let big = item("1", 2020).with_field("full_text", "x".repeat(500));
        let small = item("2", 2020);
        let writer = ChunkWriter::new(tmp.path(), "rulings", 100, 1);

        assert_eq!(writer.append(&small).await.unwrap().chunk_index, 1);
        assert_eq!(writer.append(&big).await.unwrap().chunk_index, 2);
        assert_eq!(writer.append(&small).await.unwrap().chunk_index, 3);
        let summary = writer.finish().await.unwrap();

        let big_chunk = &summary.chunks[1];
        assert!(big_chunk.bytes > 100);
        let scan = read_chunk(&big_chunk.path).await.unwrap();
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.records[0].decode().unwrap(), big);
    }

    #[tokio::test]
    async fn test_first_index_continues_numbering() {
        let tmp = TempDir::new().unwrap();
        let writer = ChunkWriter::new(tmp.path(), "laws", 1_000, 7);
        assert_eq!(writer.append(&item("1", 1999)).await.unwrap().chunk_index, 7);
        writer.finish().await.unwrap();
        let chunks = list_chunks(tmp.path(), "laws").await.unwrap();
        assert_eq!(chunks[0].index, 7);
    }

    #[tokio::test]
    async fn test_concurrent_appends_never_split_records() {
        let tmp = TempDir::new().unwrap();
        let writer = Arc::new(ChunkWriter::new(tmp.path(), "rulings", 400, 1));

        let mut handles = Vec::new();
        for n in 0..40 {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                writer.append(&item(&format!("{n:03}"), 2000 + n % 3)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let summary = writer.finish().await.unwrap();

        let mut seen = 0;
        for chunk in list_chunks(tmp.path(), "rulings").await.unwrap() {
            let scan = read_chunk(&chunk.path).await.unwrap();
            assert_eq!(scan.truncated_at, None);
            seen += scan.records.len();
        }
        assert_eq!(seen, 40);
        assert_eq!(summary.records, 40);
    }
}

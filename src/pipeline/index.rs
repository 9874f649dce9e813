//! Partition index rebuilt from chunk markers.
//!
//! The index is never authoritative. It is regenerated by scanning every
//! chunk file in index order, so two rebuilds over the same chunks produce
//! byte-identical output.
//!
//! Outputs written by [`rebuild_index`]:
//! - `index.json`: partition -> ordered `(item_id, chunk, chunk_file)`
//! - `index.html`: the same, deep-linking into chunk views
//! - `{chunk}.html`: one rendered view per chunk

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Item, ItemId, Partition, SourceProfile};
use crate::render::{columns_for, render_chunk, render_index};
use crate::storage::{list_chunks, read_chunk, write_atomic};

pub const INDEX_JSON: &str = "index.json";
pub const INDEX_HTML: &str = "index.html";

/// Where one item lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub item_id: ItemId,
    pub chunk: u32,
    /// Chunk file stem; the view is `{chunk_file}.html`
    pub chunk_file: String,
}

/// One scanned chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub index: u32,
    pub file: String,
    pub records: usize,
}

/// Partition -> items, ordered by chunk index then position in chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIndex {
    pub partitions: BTreeMap<Partition, Vec<IndexEntry>>,
    pub chunks: Vec<ChunkEntry>,
}

impl RecordIndex {
    pub fn record_count(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    /// Every indexed item id.
    pub fn item_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.partitions.values().flatten().map(|e| &e.item_id)
    }

    /// Highest chunk index seen, if any chunk exists.
    pub fn max_chunk_index(&self) -> Option<u32> {
        self.chunks.iter().map(|c| c.index).max()
    }
}

/// Builder that keeps the first occurrence of each item id.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    index: RecordIndex,
    seen: HashSet<ItemId>,
    duplicates: usize,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chunk. Records added afterwards are counted against it.
    pub fn add_chunk(&mut self, index: u32, file: impl Into<String>) {
        self.index.chunks.push(ChunkEntry {
            index,
            file: file.into(),
            records: 0,
        });
    }

    /// Add one record; returns `false` if the id was already indexed.
    pub fn add_record(
        &mut self,
        partition: Partition,
        item_id: ItemId,
        chunk: u32,
        chunk_file: &str,
    ) -> bool {
        if !self.seen.insert(item_id.clone()) {
            self.duplicates += 1;
            return false;
        }
        if let Some(entry) = self.index.chunks.iter_mut().rev().find(|c| c.index == chunk) {
            entry.records += 1;
        }
        self.index
            .partitions
            .entry(partition)
            .or_default()
            .push(IndexEntry {
                item_id,
                chunk,
                chunk_file: chunk_file.to_string(),
            });
        true
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn build(self) -> RecordIndex {
        self.index
    }
}

/// Scan chunk markers into an index without writing anything.
pub async fn scan_index(dir: &Path, prefix: &str) -> Result<RecordIndex> {
    let mut builder = IndexBuilder::new();
    for chunk in list_chunks(dir, prefix).await? {
        let stem = chunk.stem();
        let scan = read_chunk(&chunk.path).await?;
        if let Some(offset) = scan.truncated_at {
            log::warn!(
                "Chunk {} is truncated at byte {}; keeping {} complete records",
                chunk.path.display(),
                offset,
                scan.records.len()
            );
        }
        builder.add_chunk(chunk.index, &stem);
        for record in scan.records {
            builder.add_record(record.marker.partition, record.marker.item_id, chunk.index, &stem);
        }
    }
    if builder.duplicates() > 0 {
        log::warn!("{} duplicate records skipped while indexing", builder.duplicates());
    }
    Ok(builder.build())
}

/// Rebuild the index and every chunk view from chunk files alone.
pub async fn rebuild_index(dir: &Path, prefix: &str, profile: &SourceProfile) -> Result<RecordIndex> {
    let columns = columns_for(profile);
    let mut builder = IndexBuilder::new();

    for chunk in list_chunks(dir, prefix).await? {
        let stem = chunk.stem();
        let scan = read_chunk(&chunk.path).await?;
        if let Some(offset) = scan.truncated_at {
            log::warn!(
                "Chunk {} is truncated at byte {}; keeping {} complete records",
                chunk.path.display(),
                offset,
                scan.records.len()
            );
        }

        builder.add_chunk(chunk.index, &stem);
        let mut items: Vec<Item> = Vec::with_capacity(scan.records.len());
        for record in &scan.records {
            if !builder.add_record(
                record.marker.partition,
                record.marker.item_id.clone(),
                chunk.index,
                &stem,
            ) {
                continue;
            }
            match record.decode() {
                Ok(item) => items.push(item),
                Err(e) => log::warn!(
                    "Record {} in {} has an undecodable payload: {}",
                    record.marker.item_id,
                    chunk.path.display(),
                    e
                ),
            }
        }

        let view = dir.join(format!("{stem}.html"));
        write_atomic(&view, &render_chunk(&stem, &columns, &items)).await?;
        log::debug!("Rendered {} ({} records)", view.display(), items.len());
    }

    if builder.duplicates() > 0 {
        log::warn!("{} duplicate records skipped while indexing", builder.duplicates());
    }
    let index = builder.build();

    let json = serde_json::to_vec_pretty(&index)?;
    write_atomic(&dir.join(INDEX_JSON), &json).await?;
    write_atomic(&dir.join(INDEX_HTML), &render_index(prefix, &index)).await?;

    log::info!(
        "Index rebuilt: {} records in {} partitions across {} chunks",
        index.record_count(),
        index.partitions.len(),
        index.chunks.len()
    );
    Ok(index)
}

/// Load a previously written `index.json`.
pub async fn load_index(dir: &Path) -> Result<Option<RecordIndex>> {
    match tokio::fs::read(dir.join(INDEX_JSON)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

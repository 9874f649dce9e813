//! Chunk file format.
//!
//! A chunk is a sequence of self-describing records:
//!
//! ```text
//! #{"partition":2020,"item_id":"4711","len":312}\n
//! <312 bytes of JSON-encoded item>\n
//! ```
//!
//! The marker carries everything the index needs, so the index can be
//! rebuilt from chunk files alone. Chunk files are named
//! `{prefix}_{index:04}.chunk` while open and
//! `{prefix}_{index:04}_{first}-{last}.chunk` once closed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Item, ItemId, Partition};

/// File extension of chunk files.
pub const CHUNK_EXTENSION: &str = "chunk";

const MARKER_PREFIX: u8 = b'#';

/// Marker written immediately before each record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMarker {
    pub partition: Partition,
    pub item_id: ItemId,
    /// Payload length in bytes
    pub len: u64,
}

/// Serialize an item into its framed on-disk form (marker + payload).
pub fn encode_record(item: &Item) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(item)?;
    let marker = RecordMarker {
        partition: item.partition,
        item_id: item.id.clone(),
        len: payload.len() as u64,
    };

    let mut bytes = Vec::with_capacity(payload.len() + 64);
    bytes.push(MARKER_PREFIX);
    serde_json::to_writer(&mut bytes, &marker)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&payload);
    bytes.push(b'\n');
    Ok(bytes)
}

/// A complete record read back from a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    pub marker: RecordMarker,
    pub payload: Vec<u8>,
}

impl ScannedRecord {
    /// Decode the payload back into an item.
    pub fn decode(&self) -> Result<Item> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Result of scanning one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkScan {
    pub records: Vec<ScannedRecord>,
    /// Byte offset where scanning stopped early, if the tail was incomplete
    pub truncated_at: Option<usize>,
}

/// Parse every complete record in `bytes`, stopping at the first
/// incomplete or malformed one.
pub fn scan_records(bytes: &[u8]) -> ChunkScan {
    let mut scan = ChunkScan::default();
    let mut pos = 0;

    while pos < bytes.len() {
        match next_record(bytes, pos) {
            Some((record, next)) => {
                scan.records.push(record);
                pos = next;
            }
            None => {
                scan.truncated_at = Some(pos);
                break;
            }
        }
    }
    scan
}

fn next_record(bytes: &[u8], pos: usize) -> Option<(ScannedRecord, usize)> {
    if bytes[pos] != MARKER_PREFIX {
        return None;
    }
    let line_end = pos + bytes[pos..].iter().position(|&b| b == b'\n')?;
    let marker: RecordMarker = serde_json::from_slice(&bytes[pos + 1..line_end]).ok()?;

    let start = line_end + 1;
    let end = start.checked_add(usize::try_from(marker.len).ok()?)?;
    if end > bytes.len() {
        return None;
    }
    let payload = bytes[start..end].to_vec();

    let mut next = end;
    if bytes.get(next) == Some(&b'\n') {
        next += 1;
    }
    Some((ScannedRecord { marker, payload }, next))
}

/// Read and scan a chunk file. A missing file scans as empty.
pub async fn read_chunk(path: &Path) -> Result<ChunkScan> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(scan_records(&bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChunkScan::default()),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// A chunk file discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    pub index: u32,
    pub path: PathBuf,
}

impl ChunkFile {
    /// File name without the `.chunk` extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Name of an open chunk.
pub fn open_chunk_name(prefix: &str, index: u32) -> String {
    format!("{prefix}_{index:04}.{CHUNK_EXTENSION}")
}

/// Name of a closed chunk holding the given partition range.
pub fn closed_chunk_name(prefix: &str, index: u32, range: Option<(Partition, Partition)>) -> String {
    match range {
        Some((first, last)) => format!("{prefix}_{index:04}_{first}-{last}.{CHUNK_EXTENSION}"),
        None => open_chunk_name(prefix, index),
    }
}

/// Extract the chunk index from a chunk file name.
pub fn parse_chunk_index(prefix: &str, file_name: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(&format!(".{CHUNK_EXTENSION}"))?;
    let rest = stem.strip_prefix(prefix)?.strip_prefix('_')?;
    let digits = rest.split('_').next()?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// List chunk files in `dir`, ordered by index. A missing directory lists
/// as empty.
pub async fn list_chunks(dir: &Path, prefix: &str) -> Result<Vec<ChunkFile>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AppError::Io(e)),
    };

    let mut chunks = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(index) = parse_chunk_index(prefix, name) {
            chunks.push(ChunkFile {
                index,
                path: entry.path(),
            });
        }
    }
    chunks.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_item(id: &str, year: i32) -> Item {
        Item::new(ItemId::new(id), Partition(year), format!("https://example.com/{id}"))
            .with_field("court", "محكمة التمييز")
            .with_field("number", "12")
    }

    #[test]
    fn test_scan_reads_back_records() {
        let mut bytes = encode_record(&sample_item("1", 2020)).unwrap();
        bytes.extend(encode_record(&sample_item("2", 2021)).unwrap());

        let scan = scan_records(&bytes);
        assert_eq!(scan.truncated_at, None);
        assert_eq!(scan.records.len(), 2);
        assert_eq!(scan.records[1].marker.item_id, ItemId::new("2"));
        assert_eq!(scan.records[1].marker.partition, Partition(2021));
        assert_eq!(scan.records[0].decode().unwrap(), sample_item("1", 2020));
    }

    #[test]
    fn test_truncated_payload_keeps_complete_prefix() {
        let first = encode_record(&sample_item("1", 2020)).unwrap();
        let second = encode_record(&sample_item("2", 2020)).unwrap();
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..second.len() - 10]);

        let scan = scan_records(&bytes);
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.truncated_at, Some(first.len()));
    }

    #[test]
    fn test_truncated_marker_line() {
        let scan = scan_records(b"#{\"partition\":2020,\"item_");
        assert!(scan.records.is_empty());
        assert_eq!(scan.truncated_at, Some(0));
    }

    #[test]
    fn test_garbage_stops_scan() {
        let mut bytes = encode_record(&sample_item("1", 2020)).unwrap();
        bytes.extend_from_slice(b"not a record\n");
        let scan = scan_records(&bytes);
        assert_eq!(scan.records.len(), 1);
        assert!(scan.truncated_at.is_some());
    }

    #[test]
    fn test_chunk_names() {
        assert_eq!(open_chunk_name("rulings", 3), "rulings_0003.chunk");
        assert_eq!(
            closed_chunk_name("rulings", 3, Some((Partition(2019), Partition(2021)))),
            "rulings_0003_2019-2021.chunk"
        );
        assert_eq!(parse_chunk_index("rulings", "rulings_0003.chunk"), Some(3));
        assert_eq!(
            parse_chunk_index("rulings", "rulings_0012_2019-2021.chunk"),
            Some(12)
        );
        assert_eq!(parse_chunk_index("rulings", "rulings_0003.html"), None);
        assert_eq!(parse_chunk_index("rulings", "laws_0003.chunk"), None);
        assert_eq!(parse_chunk_index("my_rulings", "my_rulings_0001.chunk"), Some(1));
    }

    #[tokio::test]
    async fn test_read_missing_chunk_is_empty() {
        let tmp = TempDir::new().unwrap();
        let scan = read_chunk(&tmp.path().join("rulings_0001.chunk")).await.unwrap();
        assert!(scan.records.is_empty());
    }

    #[tokio::test]
    async fn test_list_chunks_sorted_by_index() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "rulings_0010_2020-2020.chunk",
            "rulings_0002.chunk",
            "rulings_0001_2019-2020.chunk",
            "rulings_0001_2019-2020.html",
            "index.html",
        ] {
            tokio::fs::write(tmp.path().join(name), b"").await.unwrap();
        }

        let chunks = list_chunks(tmp.path(), "rulings").await.unwrap();
        let indices: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 10]);
        assert_eq!(chunks[0].stem(), "rulings_0001_2019-2020");
    }

    #[tokio::test]
    async fn test_list_chunks_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let chunks = list_chunks(&tmp.path().join("nope"), "rulings").await.unwrap();
        assert!(chunks.is_empty());
    }
}

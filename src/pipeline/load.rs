// src/pipeline/load.rs

//! Replay chunk records into the relational sink.

use crate::error::Result;
use crate::models::{Config, Item};
use crate::storage::{RecordSink, list_chunks, read_chunk};
use crate::utils::log::{header, summary};

/// Counters for one load run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub chunks: usize,
    pub records: usize,
    pub undecodable: usize,
    pub failed_batches: usize,
}

/// Persist every record of every chunk, one sink batch per chunk.
///
/// Sink failures are logged and counted; only reading chunks can fail the
/// run.
pub async fn run_load(config: &Config, sink: &dyn RecordSink) -> Result<LoadStats> {
    let dir = config.output.dir.as_path();
    let prefix = config.output.file_prefix.as_str();
    header(&format!("Loading {} into the record sink", dir.display()));

    let mut stats = LoadStats::default();
    for chunk in list_chunks(dir, prefix).await? {
        let scan = read_chunk(&chunk.path).await?;
        let mut items: Vec<Item> = Vec::with_capacity(scan.records.len());
        for record in &scan.records {
            match record.decode() {
                Ok(item) => items.push(item),
                Err(e) => {
                    stats.undecodable += 1;
                    log::warn!("Skipping record {}: {}", record.marker.item_id, e);
                }
            }
        }

        stats.chunks += 1;
        stats.records += items.len();
        if items.is_empty() {
            continue;
        }
        if let Err(e) = sink.persist(&items).await {
            stats.failed_batches += 1;
            log::warn!("Sink failed for {}: {}", chunk.path.display(), e);
        } else {
            log::info!("Loaded {} records from {}", items.len(), chunk.path.display());
        }
    }

    summary(
        "Load",
        &[
            ("Chunks", stats.chunks.to_string()),
            ("Records", stats.records.to_string()),
            ("Undecodable", stats.undecodable.to_string()),
            ("Failed batches", stats.failed_batches.to_string()),
        ],
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{ItemId, Partition};
    use crate::storage::ChunkWriter;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl RecordSink for RecordingSink {
        async fn persist(&self, items: &[Item]) -> Result<()> {
            if self.fail {
                return Err(AppError::sink("database is locked"));
            }
            let ids = items.iter().map(|i| i.id.to_string()).collect();
            self.batches.lock().unwrap().push(ids);
            Ok(())
        }
    }

    async fn config_with_chunks(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.output.dir = tmp.path().to_path_buf();
        let writer = ChunkWriter::new(tmp.path(), &config.output.file_prefix, 250, 1);
        for (id, year) in [("1", 2020), ("2", 2020), ("3", 2021)] {
            let item = Item::new(ItemId::new(id), Partition(year), format!("https://example.com/{id}"))
                .with_field("court", "محكمة التمييز الجزائية");
            writer.append(&item).await.unwrap();
        }
        writer.finish().await.unwrap();
        config
    }

    #[tokio::test]
    async fn test_load_replays_every_record() {
        let tmp = TempDir::new().unwrap();
        let config = config_with_chunks(&tmp).await;
        let sink = RecordingSink::default();

        let stats = run_load(&config, &sink).await.unwrap();

        assert_eq!(stats.records, 3);
        let ids: Vec<String> = sink.batches.lock().unwrap().concat();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let config = config_with_chunks(&tmp).await;
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };

        let stats = run_load(&config, &sink).await.unwrap();
        assert_eq!(stats.failed_batches, stats.chunks);
    }
}

//! Relational record sink.
//!
//! The sink is best-effort and secondary to chunk files: a failed batch is
//! reported to the caller, which logs it and carries on.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Item;

/// Destination for crawled records besides the chunk files.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist a batch of items.
    async fn persist(&self, items: &[Item]) -> Result<()>;
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSink;

#[cfg(feature = "sqlite")]
mod sqlite {
    use std::path::Path;
    use std::sync::{Arc, Mutex, PoisonError};

    use async_trait::async_trait;
    use rusqlite::{Connection, Transaction, params};

    use super::RecordSink;
    use crate::error::{AppError, Result};
    use crate::models::{Item, SourceKind};

    const SCHEMA: &str = "
        PRAGMA foreign_keys=ON;
        CREATE TABLE IF NOT EXISTS courts (
          court_id INTEGER PRIMARY KEY,
          court_name TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS judges (
          judge_id INTEGER PRIMARY KEY,
          judge_name TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS rulings (
          ruling_id TEXT PRIMARY KEY,
          court_id INTEGER REFERENCES courts(court_id),
          ruling_number TEXT,
          year INTEGER NOT NULL,
          date TEXT,
          president_id INTEGER REFERENCES judges(judge_id),
          full_text TEXT
        );
        CREATE TABLE IF NOT EXISTS ruling_members (
          ruling_id TEXT NOT NULL REFERENCES rulings(ruling_id),
          judge_id INTEGER NOT NULL REFERENCES judges(judge_id),
          role TEXT NOT NULL,
          PRIMARY KEY (ruling_id, judge_id, role)
        );
        CREATE TABLE IF NOT EXISTS laws (
          law_id TEXT PRIMARY KEY,
          year INTEGER NOT NULL,
          subdetails TEXT,
          publish_date TEXT,
          page_number TEXT,
          notes TEXT,
          articles TEXT
        );
    ";

    /// SQLite-backed sink. Each record is written in its own transaction so
    /// a failure never leaves orphaned member links behind.
    #[derive(Clone)]
    pub struct SqliteSink {
        conn: Arc<Mutex<Connection>>,
        kind: SourceKind,
    }

    impl SqliteSink {
        /// Open (or create) the database and ensure the schema exists.
        pub fn open(path: &Path, kind: SourceKind) -> Result<Self> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Self::from_connection(Connection::open(path)?, kind)
        }

        /// In-memory database, mainly for tests.
        pub fn in_memory(kind: SourceKind) -> Result<Self> {
            Self::from_connection(Connection::open_in_memory()?, kind)
        }

        fn from_connection(conn: Connection, kind: SourceKind) -> Result<Self> {
            conn.execute_batch(SCHEMA)?;
            Ok(Self {
                conn: Arc::new(Mutex::new(conn)),
                kind,
            })
        }

        /// Run a read-only closure against the connection.
        pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        }

        fn persist_blocking(&self, items: &[Item]) -> Result<()> {
            let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let mut failures = 0usize;

            for item in items {
                let outcome = conn
                    .transaction()
                    .map_err(AppError::from)
                    .and_then(|tx| {
                        match self.kind {
                            SourceKind::Rulings => insert_ruling(&tx, item)?,
                            SourceKind::Laws => insert_law(&tx, item)?,
                        }
                        tx.commit().map_err(AppError::from)
                    });
                if let Err(e) = outcome {
                    failures += 1;
                    log::warn!("Sink rejected item {}: {}", item.id, e);
                }
            }

            if failures > 0 {
                return Err(AppError::sink(format!(
                    "{failures} of {} records failed",
                    items.len()
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RecordSink for SqliteSink {
        async fn persist(&self, items: &[Item]) -> Result<()> {
            if items.is_empty() {
                return Ok(());
            }
            let sink = self.clone();
            let items = items.to_vec();
            tokio::task::spawn_blocking(move || sink.persist_blocking(&items))
                .await
                .map_err(|e| AppError::Task(e.to_string()))?
        }
    }

    fn non_empty(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    fn judge_id(tx: &Transaction<'_>, name: &str) -> Result<i64> {
        tx.execute(
            "INSERT INTO judges (judge_name) VALUES (?1) ON CONFLICT(judge_name) DO NOTHING",
            params![name],
        )?;
        Ok(tx.query_row(
            "SELECT judge_id FROM judges WHERE judge_name = ?1",
            params![name],
            |row| row.get(0),
        )?)
    }

    fn court_id(tx: &Transaction<'_>, name: &str) -> Result<i64> {
        tx.execute(
            "INSERT INTO courts (court_name) VALUES (?1) ON CONFLICT(court_name) DO NOTHING",
            params![name],
        )?;
        Ok(tx.query_row(
            "SELECT court_id FROM courts WHERE court_name = ?1",
            params![name],
            |row| row.get(0),
        )?)
    }

    fn insert_ruling(tx: &Transaction<'_>, item: &Item) -> Result<()> {
        let court = non_empty(item.field("court"))
            .map(|name| court_id(tx, name))
            .transpose()?;
        let president = non_empty(item.field("president"))
            .map(|name| judge_id(tx, name))
            .transpose()?;

        tx.execute(
            "INSERT INTO rulings (ruling_id, court_id, ruling_number, year, date, president_id, full_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(ruling_id) DO UPDATE SET
               court_id=excluded.court_id, ruling_number=excluded.ruling_number,
               year=excluded.year, date=excluded.date,
               president_id=excluded.president_id, full_text=excluded.full_text",
            params![
                item.id.as_str(),
                court,
                item.field("number"),
                item.partition.year(),
                item.field("date"),
                president,
                item.field("full_text"),
            ],
        )?;

        tx.execute(
            "DELETE FROM ruling_members WHERE ruling_id = ?1",
            params![item.id.as_str()],
        )?;
        if let Some(members) = non_empty(item.field("members")) {
            for member in members.split('/').map(str::trim).filter(|m| !m.is_empty()) {
                let member_id = judge_id(tx, member)?;
                tx.execute(
                    "INSERT OR IGNORE INTO ruling_members (ruling_id, judge_id, role)
                     VALUES (?1, ?2, 'member')",
                    params![item.id.as_str(), member_id],
                )?;
            }
        }
        Ok(())
    }

    fn insert_law(tx: &Transaction<'_>, item: &Item) -> Result<()> {
        tx.execute(
            "INSERT INTO laws (law_id, year, subdetails, publish_date, page_number, notes, articles)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(law_id) DO UPDATE SET
               year=excluded.year, subdetails=excluded.subdetails,
               publish_date=excluded.publish_date, page_number=excluded.page_number,
               notes=excluded.notes, articles=excluded.articles",
            params![
                item.id.as_str(),
                item.partition.year(),
                item.field("subdetails"),
                item.field("publish_date"),
                item.field("page_number"),
                item.field("notes"),
                item.field("articles"),
            ],
        )?;
        Ok(())
    }

}

use crate::model::{StatementFrequency, StorageError};
use crate::storage::{ArtifactKind, BlobStore, CacheKey, DiskStore};
use crate::utils::{format_date, parse_date};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

/// Artifact blobs in one SQLite table. A missing statement date is stored
/// as an empty string so the unique constraint covers undated artifacts.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database and creates the `artifacts` table if needed.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                frequency TEXT NOT NULL,
                artifact_kind TEXT NOT NULL,
                statement_date TEXT NOT NULL DEFAULT '',
                blob BLOB NOT NULL,
                stored_at TEXT NOT NULL DEFAULT '',
                UNIQUE (ticker, frequency, artifact_kind, statement_date)
            );
            "
        )?;

        Ok(Self { conn })
    }

    fn date_column(key: &CacheKey) -> String {
        key.statement_date.map(format_date).unwrap_or_default()
    }

    /// Keys stored for `ticker`, ordered by kind and date.
    pub fn keys_for(&self, ticker: &str) -> Result<Vec<CacheKey>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT ticker, frequency, artifact_kind, statement_date FROM artifacts
             WHERE ticker = ?1 ORDER BY artifact_kind, frequency, statement_date",
        )?;
        let rows = stmt.query_map(params![ticker], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut keys = Vec::new();
        for row in rows {
            let (ticker, frequency, kind, date) = row?;
            let invalid = || StorageError::InvalidKey(format!("{}/{}/{}/{}", ticker, frequency, kind, date));
            let frequency = StatementFrequency::from_abbr(&frequency).ok_or_else(invalid)?;
            let kind = ArtifactKind::from_name(&kind).ok_or_else(invalid)?;
            let statement_date = if date.is_empty() {
                None
            } else {
                Some(parse_date(&date).ok_or_else(invalid)?)
            };
            keys.push(CacheKey {
                ticker,
                frequency,
                kind,
                statement_date,
            });
        }
        Ok(keys)
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Copies every figure found in `disk` into the table, parsing the
    /// ticker, frequency and statement date back from each file name.
    pub fn import_from_disk(&self, disk: &DiskStore) -> Result<usize, StorageError> {
        let mut imported = 0;
        for key in disk.list()?.into_iter().filter(|k| k.kind.is_figure()) {
            if let Some(blob) = disk.get(&key)? {
                self.put(&key, &blob)?;
                debug!("Imported {}", key);
                imported += 1;
            }
        }
        info!("Imported {} figures from {}", imported, disk.root().display());
        Ok(imported)
    }
}

impl BlobStore for SqliteStorage {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StorageError> {
        let blob = self
            .conn
            .query_row(
                "SELECT blob FROM artifacts
                 WHERE ticker = ?1 AND frequency = ?2 AND artifact_kind = ?3 AND statement_date = ?4",
                params![
                    &key.ticker,
                    key.frequency.abbr(),
                    key.kind.as_str(),
                    Self::date_column(key),
                ],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(blob)
    }

    fn put(&self, key: &CacheKey, blob: &[u8]) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO artifacts (ticker, frequency, artifact_kind, statement_date, blob, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
            params![
                &key.ticker,
                key.frequency.abbr(),
                key.kind.as_str(),
                Self::date_column(key),
                blob,
            ],
        )?;
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM artifacts
             WHERE ticker = ?1 AND frequency = ?2 AND artifact_kind = ?3 AND statement_date = ?4",
            params![
                &key.ticker,
                key.frequency.abbr(),
                key.kind.as_str(),
                Self::date_column(key),
            ],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }
}

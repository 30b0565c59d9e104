//! Point store: decoded samples in a local SQLite file, one table per variable.
//!
//! Every operation opens its own connection and closes it when done; nothing
//! is held open between calls. Rows are unique on the full tuple
//! `(time, lon, lat, val, source)` and inserts use `INSERT OR IGNORE`, so
//! ingesting the same raw file twice adds nothing.

pub mod error;

use crate::store::error::StoreError;
use crate::types::region::BoundingBox;
use crate::types::sample::{PointSample, PointSeries};
use crate::types::time::TimeRange;
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, QueryBuilder, Sqlite, SqliteConnection};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATABASE_FILE_NAME: &str = "geospatial.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
// Five bound parameters per row, well below SQLite's variable limit.
const INSERT_BATCH_ROWS: usize = 1000;

/// Row counts of a table around one [`PointStore::insert_ignore`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReport {
    pub before: i64,
    pub after: i64,
}

impl InsertReport {
    pub fn inserted(&self) -> i64 {
        self.after - self.before
    }
}

#[derive(Debug, Clone)]
pub struct PointStore {
    path: PathBuf,
    options: SqliteConnectOptions,
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`. Table names are spliced into SQL, so
/// nothing else gets through.
pub fn validate_table(table: &str) -> Result<&str, StoreError> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(table)
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

impl PointStore {
    /// The database file is created on first use, not here.
    pub fn open(path: &Path) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        Self {
            path: path.to_path_buf(),
            options,
        }
    }

    /// `<root>/geospatial.db`.
    pub fn in_dir(root: &Path) -> Self {
        Self::open(&root.join(DATABASE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> Result<SqliteConnection, StoreError> {
        SqliteConnection::connect_with(&self.options)
            .await
            .map_err(|e| StoreError::Connect(self.path.clone(), e))
    }

    async fn create_table(conn: &mut SqliteConnection, table: &str) -> Result<(), StoreError> {
        let table = validate_table(table)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                val    REAL    NOT NULL,
                lat    REAL    NOT NULL,
                lon    REAL    NOT NULL,
                time   INTEGER NOT NULL,
                source TEXT    NOT NULL
            )"
        ))
        .execute(&mut *conn)
        .await?;
        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table} ON {table}(time, lon, lat, val, source)"
        ))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn exists_on(conn: &mut SqliteConnection, table: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    async fn count_on(conn: &mut SqliteConnection, table: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    /// Creates the table and its unique index if missing. Idempotent.
    pub async fn ensure_schema(&self, table: &str) -> Result<(), StoreError> {
        validate_table(table)?;
        let mut conn = self.connect().await?;
        Self::create_table(&mut conn, table).await?;
        conn.close().await?;
        Ok(())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        validate_table(table)?;
        let mut conn = self.connect().await?;
        let exists = Self::exists_on(&mut conn, table).await?;
        conn.close().await?;
        Ok(exists)
    }

    /// Number of rows in `table`, 0 when the table does not exist yet.
    pub async fn row_count(&self, table: &str) -> Result<i64, StoreError> {
        validate_table(table)?;
        let mut conn = self.connect().await?;
        let count = if Self::exists_on(&mut conn, table).await? {
            Self::count_on(&mut conn, table).await?
        } else {
            0
        };
        conn.close().await?;
        Ok(count)
    }

    /// Inserts `samples` in one transaction, silently skipping rows that
    /// already exist. The counts are taken inside the same transaction.
    pub async fn insert_ignore(
        &self,
        table: &str,
        samples: &[PointSample],
    ) -> Result<InsertReport, StoreError> {
        let table = validate_table(table)?;
        let mut conn = self.connect().await?;
        Self::create_table(&mut conn, table).await?;

        let mut tx = conn.begin().await?;
        let before = Self::count_on(&mut *tx, table).await?;
        for batch in samples.chunks(INSERT_BATCH_ROWS) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT OR IGNORE INTO {table} (val, lat, lon, time, source) "
            ));
            qb.push_values(batch, |mut b, sample| {
                b.push_bind(sample.value)
                    .push_bind(sample.lat)
                    .push_bind(sample.lon)
                    .push_bind(sample.time)
                    .push_bind(sample.source.as_str());
            });
            qb.build().execute(&mut *tx).await?;
        }
        let after = Self::count_on(&mut *tx, table).await?;
        tx.commit().await?;
        conn.close().await?;

        debug!(
            "{}: {} samples offered, {} rows before, {} after",
            table,
            samples.len(),
            before,
            after
        );
        Ok(InsertReport { before, after })
    }

    /// Rows of `table` inside `region` (bounds inclusive) and `range`, ordered by
    /// time, then lat, then lon. A table that does not exist yields an empty series.
    pub async fn query(
        &self,
        table: &str,
        region: &BoundingBox,
        range: &TimeRange,
    ) -> Result<PointSeries, StoreError> {
        let table = validate_table(table)?;
        let mut conn = self.connect().await?;
        if !Self::exists_on(&mut conn, table).await? {
            conn.close().await?;
            return Ok(PointSeries::empty());
        }

        let rows: Vec<(f64, f64, f64, i64)> = sqlx::query_as(&format!(
            "SELECT val, lat, lon, time FROM {table}
             WHERE lat >= ? AND lat <= ? AND lon >= ? AND lon <= ? AND time >= ? AND time <= ?
             ORDER BY time, lat, lon ASC"
        ))
        .bind(region.south())
        .bind(region.north())
        .bind(region.west())
        .bind(region.east())
        .bind(range.start_hours())
        .bind(range.end_hours())
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        let mut series = PointSeries::with_capacity(rows.len());
        for (val, lat, lon, time) in rows {
            series.push(val, lat, lon, time as f64);
        }
        Ok(series)
    }

    /// `sqrt(u^2 + v^2)` over rows of `table_u` and `table_v` sharing the exact
    /// same (lat, lon, time). Points present in only one table are dropped. Empty
    /// when either table does not exist.
    pub async fn query_magnitude(
        &self,
        table_u: &str,
        table_v: &str,
        region: &BoundingBox,
        range: &TimeRange,
    ) -> Result<PointSeries, StoreError> {
        let table_u = validate_table(table_u)?;
        let table_v = validate_table(table_v)?;
        let mut conn = self.connect().await?;
        if !Self::exists_on(&mut conn, table_u).await? || !Self::exists_on(&mut conn, table_v).await?
        {
            conn.close().await?;
            return Ok(PointSeries::empty());
        }

        let rows: Vec<(f64, f64, f64, f64, i64)> = sqlx::query_as(&format!(
            "SELECT u.val, v.val, u.lat, u.lon, u.time
             FROM {table_u} AS u
             INNER JOIN {table_v} AS v
                ON u.lat = v.lat AND u.lon = v.lon AND u.time = v.time
             WHERE u.lat >= ? AND u.lat <= ? AND u.lon >= ? AND u.lon <= ?
               AND u.time >= ? AND u.time <= ?
             ORDER BY u.time, u.lat, u.lon ASC"
        ))
        .bind(region.south())
        .bind(region.north())
        .bind(region.west())
        .bind(region.east())
        .bind(range.start_hours())
        .bind(range.end_hours())
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        let mut series = PointSeries::with_capacity(rows.len());
        for (u, v, lat, lon, time) in rows {
            series.push(u.hypot(v), lat, lon, time as f64);
        }
        Ok(series)
    }
}

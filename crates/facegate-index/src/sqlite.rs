//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian f32 blobs and scored with an exact
//! scan per query. The connection runs in `locking_mode = EXCLUSIVE` and takes
//! the write lock at open, so a second handle on the same file fails fast with
//! `IndexError::Unavailable` until this one is closed or dropped.

use crate::codec::{decode_vector, encode_vector};
use facegate_core::{
    check_point, CollectionInfo, Distance, IndexError, Point, RecordPayload, ScoredPoint,
    VectorIndex,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name        TEXT PRIMARY KEY,
    dimension   INTEGER NOT NULL,
    distance    TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS points (
    collection  TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id          TEXT NOT NULL,
    vector      BLOB NOT NULL,
    payload     TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
";

pub struct SqliteIndex {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteIndex {
    /// Open (creating if needed) the index file and take its exclusive lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IndexError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path).map_err(map_sqlite)?;
        conn.busy_timeout(Duration::ZERO).map_err(map_sqlite)?;
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")
            .map_err(map_sqlite)?;
        Self::init(&conn)?;
        // Held until the connection closes in exclusive locking mode.
        conn.execute_batch("BEGIN EXCLUSIVE; COMMIT;")
            .map_err(map_sqlite)?;

        tracing::info!(path = %path.display(), "index opened (exclusive lock held)");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory index, for tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite)?;
        Self::init(&conn)?;
        Ok(Self { conn, path: None })
    }

    fn init(conn: &Connection) -> Result<(), IndexError> {
        conn.pragma_update(None, "foreign_keys", 1)
            .map_err(map_sqlite)?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sqlite)
    }

    fn schema(&self, collection: &str) -> Result<(usize, Distance), IndexError> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT dimension, distance FROM collections WHERE name = ?1",
                params![collection],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(map_sqlite)?;

        let (dimension, distance) =
            row.ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        let distance = Distance::parse(&distance)
            .ok_or_else(|| IndexError::Storage(format!("unknown distance {distance:?}")))?;
        let dimension = usize::try_from(dimension)
            .map_err(|_| IndexError::Storage(format!("invalid dimension {dimension}")))?;
        Ok((dimension, distance))
    }
}

impl VectorIndex for SqliteIndex {
    fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite)?;
        Ok(exists.is_some())
    }

    fn create_collection(
        &mut self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), IndexError> {
        let dimension = i64::try_from(dimension)
            .map_err(|_| IndexError::Storage(format!("dimension {dimension} too large")))?;
        self.conn
            .execute(
                "INSERT INTO collections (name, dimension, distance, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    name,
                    dimension,
                    distance.as_str(),
                    chrono::Utc::now().to_rfc3339()
                ],
            )
            .map_err(map_sqlite)?;
        Ok(())
    }

    fn delete_collection(&mut self, name: &str) -> Result<bool, IndexError> {
        let tx = self.conn.transaction().map_err(map_sqlite)?;
        tx.execute("DELETE FROM points WHERE collection = ?1", params![name])
            .map_err(map_sqlite)?;
        let deleted = tx
            .execute("DELETE FROM collections WHERE name = ?1", params![name])
            .map_err(map_sqlite)?;
        tx.commit().map_err(map_sqlite)?;
        Ok(deleted > 0)
    }

    fn upsert(&mut self, collection: &str, points: Vec<Point>) -> Result<(), IndexError> {
        let (dimension, _) = self.schema(collection)?;
        for p in &points {
            check_point(collection, dimension, p)?;
        }

        let tx = self.conn.transaction().map_err(map_sqlite)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO points (collection, id, vector, payload)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(collection, id) DO UPDATE SET
                        vector = excluded.vector,
                        payload = excluded.payload",
                )
                .map_err(map_sqlite)?;
            for p in &points {
                let payload = serde_json::to_string(&p.payload)
                    .map_err(|e| IndexError::Storage(format!("payload encode: {e}")))?;
                stmt.execute(params![collection, p.id, encode_vector(&p.vector), payload])
                    .map_err(map_sqlite)?;
            }
        }
        tx.commit().map_err(map_sqlite)?;

        tracing::debug!(collection, count = points.len(), "points upserted");
        Ok(())
    }

    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_floor: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        let (dimension, distance) = self.schema(collection)?;
        if vector.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: dimension,
                actual: vector.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id, vector, payload FROM points WHERE collection = ?1")
            .map_err(map_sqlite)?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(map_sqlite)?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, blob, payload) = row.map_err(map_sqlite)?;
            let stored = decode_vector(&blob, dimension)?;
            let score = distance.score(vector, &stored);
            if score_floor.is_some_and(|floor| !(score >= floor)) {
                continue;
            }
            let payload: RecordPayload = serde_json::from_str(&payload)
                .map_err(|e| IndexError::Storage(format!("payload decode for {id}: {e}")))?;
            hits.push(ScoredPoint { id, score, payload });
        }

        // Ties break on id so results are reproducible.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo, IndexError> {
        let (dimension, distance) = self.schema(collection)?;
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM points WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(map_sqlite)?;
        Ok(CollectionInfo {
            name: collection.to_string(),
            dimension,
            distance,
            points_count: count.max(0) as u64,
        })
    }

    fn close(self) -> Result<(), IndexError> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| map_sqlite(e))?;
        if let Some(path) = path {
            tracing::info!(path = %path.display(), "index closed (lock released)");
        }
        Ok(())
    }
}

/// Lock contention and unopenable files mean "unavailable"; anything else is
/// a storage fault.
fn map_sqlite(err: rusqlite::Error) -> IndexError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
            ) =>
        {
            IndexError::Unavailable(err.to_string())
        }
        _ => IndexError::Storage(err.to_string()),
    }
}

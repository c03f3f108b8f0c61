//! SQLite implementation of the FilterStorage trait.
//!
//! Host-side stand-in for the node's flash records: one row per filter, plus
//! a CBOR-encoded master record in the `state` table. Each filter row carries
//! a CRC so corrupted records are dropped at boot instead of being served.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use assetmesh_core::{crc16, FilterId, MasterSummary};

use crate::error::{StorageError, StorageResult};
use crate::migration::{self, now_millis};
use crate::traits::{FilterStorage, StoredFilter};

const MASTER_KEY: &str = "master";

/// SQLite-based storage implementation.
///
/// Thread-safe via an internal mutex. Clones share the connection.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> StorageResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> StorageResult<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut conn)
    }
}

fn encode_master(master: &MasterSummary) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(master, &mut buf)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_master(bytes: &[u8]) -> StorageResult<MasterSummary> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl FilterStorage for SqliteStorage {
    fn load_filters(&self) -> StorageResult<Vec<StoredFilter>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT filter_id, data, crc FROM filters ORDER BY filter_id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, u8>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Option<u16>>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut filters = Vec::with_capacity(rows.len());
            for (id, bytes, stored_crc) in rows {
                let id = FilterId(id);
                if let Some(stored_crc) = stored_crc {
                    let actual = crc16(&bytes);
                    if actual != stored_crc {
                        warn!(
                            filter_id = %id,
                            stored_crc,
                            actual,
                            "dropping corrupted filter record"
                        );
                        continue;
                    }
                }
                filters.push(StoredFilter { id, bytes });
            }
            Ok(filters)
        })
    }

    fn load_master(&self) -> StorageResult<Option<MasterSummary>> {
        self.with_conn(|conn| {
            let value: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT value FROM state WHERE key = ?1",
                    params![MASTER_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            value.map(|bytes| decode_master(&bytes)).transpose()
        })
    }

    fn persist_filter(&self, id: FilterId, bytes: &[u8]) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO filters (filter_id, data, crc, stored_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(filter_id) DO UPDATE SET
                    data = excluded.data,
                    crc = excluded.crc,
                    stored_at = excluded.stored_at",
                params![id.get(), bytes, crc16(bytes), now_millis()],
            )?;
            Ok(())
        })
    }

    fn remove_filter(&self, id: FilterId) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM filters WHERE filter_id = ?1", params![id.get()])?;
            Ok(())
        })
    }

    fn persist_master(&self, master: &MasterSummary) -> StorageResult<()> {
        let value = encode_master(master)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![MASTER_KEY, value],
            )?;
            Ok(())
        })
    }

    fn clear(&self) -> StorageResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM filters", [])?;
            tx.execute("DELETE FROM state WHERE key = ?1", params![MASTER_KEY])?;
            tx.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_roundtrip() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.persist_filter(FilterId(3), &[1, 2, 3]).unwrap();
        storage.persist_filter(FilterId(1), &[9]).unwrap();

        let filters = storage.load_filters().unwrap();
        assert_eq!(
            filters,
            vec![
                StoredFilter { id: FilterId(1), bytes: vec![9] },
                StoredFilter { id: FilterId(3), bytes: vec![1, 2, 3] },
            ]
        );
    }

    #[test]
    fn test_overwrite_filter() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.persist_filter(FilterId(3), &[1]).unwrap();
        storage.persist_filter(FilterId(3), &[2, 2]).unwrap();
        let filters = storage.load_filters().unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].bytes, vec![2, 2]);
    }

    #[test]
    fn test_master_roundtrip() {
        let storage = SqliteStorage::open_memory().unwrap();
        assert_eq!(storage.load_master().unwrap(), None);

        storage.persist_master(&MasterSummary::new(7, 0x1234)).unwrap();
        storage.persist_master(&MasterSummary::new(8, 0x5678)).unwrap();
        assert_eq!(storage.load_master().unwrap(), Some(MasterSummary::new(8, 0x5678)));
    }

    #[test]
    fn test_corrupted_record_dropped() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.persist_filter(FilterId(1), &[1, 2, 3]).unwrap();
        storage.persist_filter(FilterId(2), &[4, 5, 6]).unwrap();
        storage
            .with_conn(|conn| {
                conn.execute("UPDATE filters SET data = x'FFFF' WHERE filter_id = 1", [])?;
                Ok(())
            })
            .unwrap();

        let filters = storage.load_filters().unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].id, FilterId(2));
    }

    #[test]
    fn test_remove_and_clear() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.persist_filter(FilterId(1), &[1]).unwrap();
        storage.persist_filter(FilterId(2), &[2]).unwrap();
        storage.remove_filter(FilterId(1)).unwrap();
        assert_eq!(storage.load_filters().unwrap().len(), 1);

        storage.persist_master(&MasterSummary::new(1, 1)).unwrap();
        storage.clear().unwrap();
        assert!(storage.load_filters().unwrap().is_empty());
        assert_eq!(storage.load_master().unwrap(), None);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.db");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.persist_filter(FilterId(5), &[5, 5]).unwrap();
            storage.persist_master(&MasterSummary::new(2, 0xAAAA)).unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.load_filters().unwrap()[0].id, FilterId(5));
        assert_eq!(storage.load_master().unwrap(), Some(MasterSummary::new(2, 0xAAAA)));
    }
}

//! Redb-backed corpus persistence.
//!
//! Uses [redb](https://github.com/cberner/redb), a pure Rust, ACID-compliant
//! embedded B-tree database. A document replace or retract is a single write
//! transaction.
//!
//! # Tables
//!
//! - `works`: work id -> Work (JSON)
//! - `documents`: document id -> SourceRecord (JSON)
//! - `segments`: `"{work_id}\0{ordinal:020}"` -> Segment (JSON). The padded
//!   ordinal keeps each work's segments contiguous and in ordinal order.
//! - `metadata`: key -> value (JSON), holds the format version

use super::{CorpusBackend, PersistedCorpus, STORE_FORMAT_VERSION};
use crate::corpus::{Segment, SourceRecord, Work};
use crate::error::StoreError;
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const WORKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("works");
const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
const SEGMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("segments");
const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

// Metadata keys
const FORMAT_VERSION_KEY: &str = "format_version";

fn segment_key(work_id: &str, ordinal: u64) -> String {
    format!("{}\0{:020}", work_id, ordinal)
}

/// Key range covering every segment of a work.
fn work_key_range(work_id: &str) -> (String, String) {
    (format!("{}\0", work_id), format!("{}\u{1}", work_id))
}

fn serialize<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value)
        .map_err(|e| StoreError::SerializationError(format!("Failed to serialize {}: {}", what, e)))
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| {
        StoreError::SerializationError(format!("Failed to deserialize {}: {}", what, e))
    })
}

/// Redb-backed corpus backend for native platforms.
///
/// # Example
///
/// ```ignore
/// use scriptorium_core::storage::RedbBackend;
///
/// let backend = RedbBackend::open("./data/corpus.redb")?;
/// let store = CorpusStore::open(backend, RuleSet::default()).await?;
/// ```
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates missing tables and records the format version on first use.
    /// A database written with a different format version is rejected with
    /// [`StoreError::Incompatible`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| StoreError::DatabaseError(format!("Failed to open database: {}", e)))?;

        let write_txn = db.begin_write().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to begin write transaction: {}", e))
        })?;
        {
            for (table, name) in [
                (WORKS_TABLE, "works"),
                (DOCUMENTS_TABLE, "documents"),
                (SEGMENTS_TABLE, "segments"),
            ] {
                write_txn.open_table(table).map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to create {} table: {}", name, e))
                })?;
            }

            let mut metadata = write_txn.open_table(METADATA_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to create metadata table: {}", e))
            })?;
            let stored: Option<u32> = match metadata.get(FORMAT_VERSION_KEY) {
                Ok(Some(guard)) => Some(deserialize(guard.value(), "format version")?),
                Ok(None) => None,
                Err(e) => {
                    return Err(StoreError::DatabaseError(format!(
                        "Failed to read format version: {}",
                        e
                    )))
                }
            };
            match stored {
                Some(version) if version != STORE_FORMAT_VERSION => {
                    return Err(StoreError::Incompatible(format!(
                        "database format version {} (expected {})",
                        version, STORE_FORMAT_VERSION
                    )));
                }
                Some(_) => {}
                None => {
                    let bytes = serialize(&STORE_FORMAT_VERSION, "format version")?;
                    metadata
                        .insert(FORMAT_VERSION_KEY, bytes.as_slice())
                        .map_err(|e| {
                            StoreError::DatabaseError(format!(
                                "Failed to write format version: {}",
                                e
                            ))
                        })?;
                }
            }
        }
        write_txn.commit().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to commit table creation: {}", e))
        })?;

        Ok(Self { db: Arc::new(db) })
    }

    fn begin_write(&self) -> Result<WriteTransaction, StoreError> {
        self.db.begin_write().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to begin write transaction: {}", e))
        })
    }

    fn read_all<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        what: &str,
    ) -> Result<Vec<T>, StoreError> {
        let read_txn = self.db.begin_read().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to begin read transaction: {}", e))
        })?;
        let table = read_txn
            .open_table(table)
            .map_err(|e| StoreError::DatabaseError(format!("Failed to open {} table: {}", what, e)))?;
        let iter = table
            .iter()
            .map_err(|e| StoreError::DatabaseError(format!("Failed to iterate {}: {}", what, e)))?;

        let mut values = Vec::new();
        for result in iter {
            let (_, value) = result.map_err(|e| {
                StoreError::DatabaseError(format!("Failed to read {} entry: {}", what, e))
            })?;
            values.push(deserialize(value.value(), what)?);
        }
        Ok(values)
    }

    /// Removes every segment of the given works inside `write_txn`.
    fn clear_work_segments(
        write_txn: &WriteTransaction,
        works: &[String],
    ) -> Result<usize, StoreError> {
        let mut table = write_txn
            .open_table(SEGMENTS_TABLE)
            .map_err(|e| StoreError::DatabaseError(format!("Failed to open segments table: {}", e)))?;

        let mut removed = 0;
        for work_id in works {
            let (start, end) = work_key_range(work_id);
            let keys: Vec<String> = table
                .range(start.as_str()..end.as_str())
                .map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to scan segments: {}", e))
                })?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<_, _>>()
                .map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to read segment key: {}", e))
                })?;
            for key in &keys {
                table.remove(key.as_str()).map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to delete segment: {}", e))
                })?;
            }
            removed += keys.len();
        }
        Ok(removed)
    }
}

#[async_trait]
impl CorpusBackend for RedbBackend {
    async fn load(&self) -> Result<PersistedCorpus, StoreError> {
        Ok(PersistedCorpus {
            works: self.read_all(WORKS_TABLE, "works")?,
            documents: self.read_all(DOCUMENTS_TABLE, "documents")?,
            segments: self.read_all(SEGMENTS_TABLE, "segments")?,
        })
    }

    async fn put_work(&self, work: &Work) -> Result<(), StoreError> {
        let bytes = serialize(work, "work")?;
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(WORKS_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open works table: {}", e))
            })?;
            table
                .insert(work.id.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::DatabaseError(format!("Failed to insert work: {}", e)))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::DatabaseError(format!("Failed to commit work: {}", e)))?;
        Ok(())
    }

    async fn replace_document(
        &self,
        record: &SourceRecord,
        cleared_works: &[String],
        segments: &[Segment],
    ) -> Result<(), StoreError> {
        let record_bytes = serialize(record, "document record")?;
        let segment_rows = segments
            .iter()
            .map(|s| Ok((segment_key(&s.work_id, s.ordinal), serialize(s, "segment")?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let write_txn = self.begin_write()?;
        let removed = Self::clear_work_segments(&write_txn, cleared_works)?;
        {
            let mut table = write_txn.open_table(SEGMENTS_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open segments table: {}", e))
            })?;
            for (key, bytes) in &segment_rows {
                table.insert(key.as_str(), bytes.as_slice()).map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to insert segment: {}", e))
                })?;
            }

            let mut documents = write_txn.open_table(DOCUMENTS_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open documents table: {}", e))
            })?;
            documents
                .insert(record.document_id.as_str(), record_bytes.as_slice())
                .map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to insert document: {}", e))
                })?;
        }
        write_txn.commit().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to commit document replace: {}", e))
        })?;

        debug!(
            "Replaced document '{}': removed {} segments, wrote {}",
            record.document_id,
            removed,
            segment_rows.len()
        );
        Ok(())
    }

    async fn retract_document(
        &self,
        document_id: &str,
        cleared_works: &[String],
    ) -> Result<(), StoreError> {
        let write_txn = self.begin_write()?;
        let removed = Self::clear_work_segments(&write_txn, cleared_works)?;
        {
            let mut documents = write_txn.open_table(DOCUMENTS_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open documents table: {}", e))
            })?;
            documents.remove(document_id).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to delete document: {}", e))
            })?;
        }
        write_txn.commit().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to commit document retract: {}", e))
        })?;

        debug!("Retracted document '{}': removed {} segments", document_id, removed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{segment, work};
    use tempfile::TempDir;

    fn create_test_backend() -> (RedbBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = RedbBackend::open(temp_dir.path().join("corpus.redb")).unwrap();
        (backend, temp_dir)
    }

    #[test]
    fn test_segment_keys_sort_by_ordinal() {
        assert!(segment_key("w", 2) < segment_key("w", 10));
        let (start, end) = work_key_range("w");
        let key = segment_key("w", u64::MAX);
        assert!(start <= key && key < end);
        assert!(segment_key("w2", 0) > end || segment_key("w2", 0) < start);
    }

    #[tokio::test]
    async fn test_replace_and_load() {
        let (backend, _dir) = create_test_backend();
        let w = work("aeneid");
        backend.put_work(&w).await.unwrap();

        let segments: Vec<_> = (0..12u64)
            .map(|i| segment(&w, "doc", i, &format!("1.{}", i + 1), "arma"))
            .collect();
        let record = SourceRecord::new("doc", "h", "lines");
        backend
            .replace_document(&record, &["aeneid".to_string()], &segments)
            .await
            .unwrap();

        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded.works, vec![w]);
        assert_eq!(loaded.documents, vec![record]);
        let ordinals: Vec<u64> = loaded.segments.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, (0..12).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_replace_only_clears_named_works() {
        let (backend, _dir) = create_test_backend();
        let a = work("a");
        let b = work("b");
        let record_a = SourceRecord::new("doc-a", "h", "lines");
        let record_b = SourceRecord::new("doc-b", "h", "lines");
        backend
            .replace_document(&record_a, &["a".to_string()], &[segment(&a, "doc-a", 0, "1.1", "x")])
            .await
            .unwrap();
        backend
            .replace_document(&record_b, &["b".to_string()], &[segment(&b, "doc-b", 0, "1.1", "y")])
            .await
            .unwrap();
        backend
            .replace_document(&record_a, &["a".to_string()], &[segment(&a, "doc-a", 0, "1.1", "z")])
            .await
            .unwrap();

        let texts: Vec<String> = backend
            .load()
            .await
            .unwrap()
            .segments
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(texts, vec!["z", "y"]);
    }

    #[tokio::test]
    async fn test_retract() {
        let (backend, _dir) = create_test_backend();
        let w = work("w");
        let record = SourceRecord::new("doc", "h", "lines");
        backend
            .replace_document(&record, &["w".to_string()], &[segment(&w, "doc", 0, "1.1", "x")])
            .await
            .unwrap();
        backend
            .retract_document("doc", &["w".to_string()])
            .await
            .unwrap();
        let loaded = backend.load().await.unwrap();
        assert!(loaded.documents.is_empty());
        assert!(loaded.segments.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corpus.redb");
        let w = work("w");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.put_work(&w).await.unwrap();
            backend
                .replace_document(
                    &SourceRecord::new("doc", "h", "lines"),
                    &["w".to_string()],
                    &[segment(&w, "doc", 0, "1.1", "x")],
                )
                .await
                .unwrap();
        }
        let backend = RedbBackend::open(&path).unwrap();
        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded.works.len(), 1);
        assert_eq!(loaded.segments[0].tokens.len(), 1);
    }

    #[test]
    fn test_incompatible_format_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corpus.redb");
        drop(RedbBackend::open(&path).unwrap());
        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut metadata = txn.open_table(METADATA_TABLE).unwrap();
                metadata
                    .insert(FORMAT_VERSION_KEY, b"99".as_slice())
                    .unwrap();
            }
            txn.commit().unwrap();
        }
        assert!(matches!(
            RedbBackend::open(&path),
            Err(StoreError::Incompatible(_))
        ));
    }
}

//! Versioned local document store.
//!
//! Documents are JSON objects keyed by their `id`. Writing a document whose
//! key is already stored merges the two versions with the collection's
//! schema instead of replacing the stored one.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::collections::Collection;
use super::database::Database;
use crate::error::SyncError;
use crate::sync::{merge, Schema, SchemaRegistry};

/// Local document store with one table per collection.
pub struct LocalStore {
    db: Option<Database>,
    schemas: SchemaRegistry,
}

impl LocalStore {
    /// Open the store at `path`, upgrading its schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, schemas: SchemaRegistry) -> Result<Self, SyncError> {
        Ok(Self::with_database(Database::open_at(path)?, schemas))
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory(schemas: SchemaRegistry) -> Result<Self, SyncError> {
        Ok(Self::with_database(Database::open_in_memory()?, schemas))
    }

    /// Wrap an already opened database.
    #[must_use]
    pub const fn with_database(db: Database, schemas: SchemaRegistry) -> Self {
        Self {
            db: Some(db),
            schemas,
        }
    }

    /// Close the underlying connection. Later calls fail with `Closed`.
    pub fn close(&mut self) {
        if self.db.take().is_some() {
            debug!("local store closed");
        }
    }

    /// Whether the store is still open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.db.is_some()
    }

    fn conn(&self) -> Result<&Connection, SyncError> {
        self.db
            .as_ref()
            .map(Database::connection)
            .ok_or(SyncError::Closed)
    }

    /// Stored schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the version is unreadable.
    pub fn version(&self) -> Result<i32, SyncError> {
        self.db
            .as_ref()
            .ok_or(SyncError::Closed)?
            .schema_version()
    }

    /// Merge schemas in use.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Declare subform fields from the form definitions in `forms`.
    ///
    /// Returns the number of forms read.
    ///
    /// # Errors
    ///
    /// Returns an error if the forms cannot be read.
    pub fn refresh_schemas_from_forms(&mut self) -> Result<usize, SyncError> {
        let forms = self.get_all(Collection::Forms)?;
        self.schemas.extend_from_forms(&forms);
        Ok(forms.len())
    }

    /// Fetch one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a string or number, or the read fails.
    pub fn get(&self, collection: Collection, key: &Value) -> Result<Option<Value>, SyncError> {
        let key = key_string(key)?;
        read_doc(self.conn()?, collection, &key)
    }

    /// Fetch every document in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get_all(&self, collection: Collection) -> Result<Vec<Value>, SyncError> {
        query_docs(
            self.conn()?,
            &format!("SELECT data FROM {collection} ORDER BY seq"),
            [],
        )
    }

    /// Fetch every document whose `type` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get_all_from_index(
        &self,
        collection: Collection,
        value: &str,
    ) -> Result<Vec<Value>, SyncError> {
        query_docs(
            self.conn()?,
            &format!("SELECT data FROM {collection} WHERE type = ?1 ORDER BY seq"),
            [value],
        )
    }

    /// Insert a document that must not exist yet.
    ///
    /// Documents without an `id` receive the next sequence number as id.
    /// Returns the key the document was stored under.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is already taken or the write fails.
    pub fn add(&self, collection: Collection, item: Value) -> Result<String, SyncError> {
        let conn = self.conn()?;
        let doc = into_document(item)?;

        let Some(id) = doc.get("id") else {
            return insert_auto(conn, collection, doc);
        };
        let key = key_string(id)?;
        let data = serde_json::to_string(&doc)?;

        conn.execute(
            &format!("INSERT INTO {collection} (key, type, data) VALUES (?1, ?2, ?3)"),
            params![key, type_of(&doc), data],
        )
        .map_err(|e| SyncError::Database(format!("Failed to add {key} to {collection}: {e}")))?;

        Ok(key)
    }

    /// Write a document, merging it into any stored version with the same key.
    ///
    /// A mapping `key` is overlaid on the document; any other `key` value
    /// replaces the document's `id`. `query_index` sets the document `type`,
    /// which also selects the record-type schema for the merge.
    /// Returns the key the document was stored under.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not an object or storage fails.
    pub fn put(
        &self,
        collection: Collection,
        item: Value,
        key: Option<&Value>,
        query_index: Option<&str>,
    ) -> Result<String, SyncError> {
        let conn = self.conn()?;
        let mut doc = into_document(item)?;

        match key {
            Some(Value::Object(fields)) => doc.extend(fields.clone()),
            Some(key) => {
                doc.insert("id".to_string(), key.clone());
            },
            None => {},
        }
        if let Some(record_type) = query_index {
            doc.insert("type".to_string(), Value::String(record_type.to_string()));
        }

        let Some(id) = doc.get("id") else {
            return insert_auto(conn, collection, doc);
        };
        let key = key_string(id)?;

        let prev = read_doc(conn, collection, &key).inspect_err(|e| {
            warn!(%collection, %key, error = %e, "lookup before merge failed");
        })?;
        let merged = self.merge_with(collection, prev, doc);

        write_doc(conn, collection, &key, &merged).inspect_err(|e| {
            warn!(%collection, %key, error = %e, "write failed");
        })?;

        Ok(key)
    }

    /// Write many documents inside one transaction.
    ///
    /// `records` is either an array of documents or a mapping whose values
    /// are documents; a mapping key is used as `id` for documents without
    /// one. Each document is merged with its stored version. A failing
    /// document is logged and skipped; the rest are still written.
    /// Returns the number of documents written.
    ///
    /// # Errors
    ///
    /// Returns an error if `records` has the wrong shape or the transaction
    /// cannot be opened or committed.
    pub fn bulk_add(
        &self,
        collection: Collection,
        records: Value,
        query_index: Option<&str>,
    ) -> Result<usize, SyncError> {
        let items: Vec<Value> = match records {
            Value::Array(items) => items,
            Value::Object(map) => map
                .into_iter()
                .map(|(key, mut item)| {
                    if let Value::Object(doc) = &mut item {
                        doc.entry("id").or_insert(Value::String(key));
                    }
                    item
                })
                .collect(),
            other => {
                return Err(SyncError::InvalidItem(format!(
                    "bulk add expects an array or mapping, got {other}"
                )))
            },
        };

        let conn = self.conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| SyncError::Database(format!("Failed to begin transaction: {e}")))?;

        let mut written = 0;
        for item in items {
            match self.bulk_item(&tx, collection, item, query_index) {
                Ok(()) => written += 1,
                Err(e) => warn!(%collection, error = %e, "skipping document in bulk add"),
            }
        }

        tx.commit()
            .map_err(|e| SyncError::Database(format!("Failed to commit bulk add: {e}")))?;

        debug!(%collection, written, "bulk add complete");
        Ok(written)
    }

    fn bulk_item(
        &self,
        conn: &Connection,
        collection: Collection,
        item: Value,
        query_index: Option<&str>,
    ) -> Result<(), SyncError> {
        let mut doc = into_document(item)?;
        if let Some(record_type) = query_index {
            doc.insert("type".to_string(), Value::String(record_type.to_string()));
        }

        let Some(id) = doc.get("id") else {
            return insert_auto(conn, collection, doc).map(|_| ());
        };
        let key = key_string(id)?;

        let prev = read_doc(conn, collection, &key).unwrap_or_else(|e| {
            warn!(%collection, %key, error = %e, "lookup failed, writing document as new");
            None
        });
        let merged = self.merge_with(collection, prev, doc);

        write_doc(conn, collection, &key, &merged)
    }

    fn merge_with(&self, collection: Collection, prev: Option<Value>, doc: Map<String, Value>) -> Value {
        let Some(prev) = prev else {
            return Value::Object(doc);
        };

        let record_type = doc
            .get("type")
            .or_else(|| prev.get("type"))
            .and_then(Value::as_str);
        let schema: &Schema = self.schemas.schema_for(collection.as_str(), record_type);

        debug!(%collection, record_type, "merging with stored document");
        merge(prev, Value::Object(doc), schema)
    }

    /// Delete one document. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the delete fails.
    pub fn delete(&self, collection: Collection, key: &Value) -> Result<bool, SyncError> {
        let key = key_string(key)?;
        let rows = self
            .conn()?
            .execute(&format!("DELETE FROM {collection} WHERE key = ?1"), [&key])
            .map_err(|e| SyncError::Database(format!("Failed to delete {key}: {e}")))?;
        Ok(rows > 0)
    }

    /// Remove every document from a collection. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self, collection: Collection) -> Result<usize, SyncError> {
        self.conn()?
            .execute(&format!("DELETE FROM {collection}"), [])
            .map_err(|e| SyncError::Database(format!("Failed to clear {collection}: {e}")))
    }

    /// Remove every document from every collection.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails.
    pub fn clear_all(&self) -> Result<(), SyncError> {
        for collection in Collection::ALL {
            self.clear(collection)?;
        }
        Ok(())
    }

    /// Number of documents in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, collection: Collection) -> Result<i64, SyncError> {
        self.conn()?
            .query_row(&format!("SELECT COUNT(*) FROM {collection}"), [], |row| {
                row.get(0)
            })
            .map_err(|e| SyncError::Database(format!("Failed to count {collection}: {e}")))
    }
}

/// Normalise a document id to its stored key.
fn key_string(id: &Value) -> Result<String, SyncError> {
    match id {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(SyncError::InvalidItem(format!(
            "document id must be a string or number, got {other}"
        ))),
    }
}

fn into_document(item: Value) -> Result<Map<String, Value>, SyncError> {
    match item {
        Value::Object(doc) => Ok(doc),
        other => Err(SyncError::InvalidItem(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn type_of(doc: &Map<String, Value>) -> Option<&str> {
    doc.get("type").and_then(Value::as_str)
}

fn parse_doc(data: &str) -> Result<Value, SyncError> {
    serde_json::from_str(data).map_err(|e| SyncError::Parse(format!("Corrupt document: {e}")))
}

fn read_doc(conn: &Connection, collection: Collection, key: &str) -> Result<Option<Value>, SyncError> {
    let data: Option<String> = conn
        .query_row(
            &format!("SELECT data FROM {collection} WHERE key = ?1"),
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| SyncError::Database(format!("Failed to read {key} from {collection}: {e}")))?;

    data.as_deref().map(parse_doc).transpose()
}

fn query_docs<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Value>, SyncError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .map_err(|e| SyncError::Database(format!("Failed to query documents: {e}")))?;

    let mut docs = Vec::new();
    for row in rows {
        let data = row.map_err(|e| SyncError::Database(e.to_string()))?;
        docs.push(parse_doc(&data)?);
    }
    Ok(docs)
}

fn write_doc(conn: &Connection, collection: Collection, key: &str, doc: &Value) -> Result<(), SyncError> {
    let record_type = doc.get("type").and_then(Value::as_str);
    let data = serde_json::to_string(doc)?;

    conn.execute(
        &format!(
            r"INSERT INTO {collection} (key, type, data) VALUES (?1, ?2, ?3)
              ON CONFLICT(key) DO UPDATE SET type = excluded.type, data = excluded.data"
        ),
        params![key, record_type, data],
    )
    .map_err(|e| SyncError::Database(format!("Failed to write {key} to {collection}: {e}")))?;

    Ok(())
}

/// Store a document without an id under the next sequence number.
///
/// The sequence number is chosen first so the row is written by a single
/// INSERT. Numbers are never reused, even after deletes.
fn insert_auto(
    conn: &Connection,
    collection: Collection,
    mut doc: Map<String, Value>,
) -> Result<String, SyncError> {
    let seq: i64 = conn
        .query_row(
            &format!(
                r"SELECT MAX(
                      COALESCE((SELECT seq FROM sqlite_sequence WHERE name = ?1), 0),
                      COALESCE((SELECT MAX(seq) FROM {collection}), 0)
                  ) + 1"
            ),
            [collection.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| SyncError::Database(format!("Failed to allocate id in {collection}: {e}")))?;

    doc.insert("id".to_string(), Value::from(seq));
    let key = seq.to_string();

    conn.execute(
        &format!("INSERT INTO {collection} (seq, key, type, data) VALUES (?1, ?2, ?3, ?4)"),
        params![seq, key, type_of(&doc), serde_json::to_string(&doc)?],
    )
    .map_err(|e| SyncError::Database(format!("Failed to insert {key} into {collection}: {e}")))?;

    Ok(key)
}

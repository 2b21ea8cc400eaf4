//! SQLite-backed document store.
//!
//! Documents live as JSON text in a single `documents` table keyed by
//! (collection, partition, sort). Guard conditions compile to `WHERE`
//! fragments over the JSON1 functions, so every guarded write is a
//! single atomic SQL statement — the same single-key atomicity contract
//! a remote document store gives a conditional put.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use crate::{Condition, DocumentStore, Key, PutOutcome, ReadMode, Result, StoreError, WriteOutcome};

/// Document store over a SQLite database, file-backed or in-memory.
///
/// The connection sits behind a mutex so one store can be shared across
/// threads; contention is per-statement only.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(backend)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                pk TEXT NOT NULL,
                sk TEXT NOT NULL DEFAULT '',
                doc TEXT NOT NULL,
                PRIMARY KEY (collection, pk, sk)
            );
            ",
            )
            .map_err(backend)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection mutex poisoned".to_string()))
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn sort_key(key: &Key) -> &str {
    key.sort.as_deref().unwrap_or("")
}

/// JSON1 path for a trusted top-level field name.
fn path(field: &str) -> String {
    debug_assert!(
        field.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'),
        "field names are crate-internal identifiers"
    );
    format!("$.{field}")
}

/// Compile guard conditions to SQL fragments, pushing their parameters
/// in appearance order.
fn compile_conditions(conditions: &[Condition], params: &mut Vec<SqlValue>) -> String {
    let mut sql = String::new();
    for cond in conditions {
        sql.push_str(" AND ");
        match cond {
            Condition::FieldEquals { field, value } => match value {
                Value::Null => {
                    sql.push_str(&format!("json_extract(doc, '{}') IS NULL", path(field)));
                }
                Value::Bool(b) => {
                    sql.push_str(&format!("json_extract(doc, '{}') = ?", path(field)));
                    params.push(SqlValue::Integer(i64::from(*b)));
                }
                Value::Number(n) => {
                    sql.push_str(&format!("json_extract(doc, '{}') = ?", path(field)));
                    if let Some(i) = n.as_i64() {
                        params.push(SqlValue::Integer(i));
                    } else {
                        params.push(SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)));
                    }
                }
                Value::String(s) => {
                    sql.push_str(&format!("json_extract(doc, '{}') = ?", path(field)));
                    params.push(SqlValue::Text(s.clone()));
                }
                // Arrays and objects compare canonicalized JSON text.
                other => {
                    sql.push_str(&format!(
                        "json(json_extract(doc, '{}')) = json(?)",
                        path(field)
                    ));
                    params.push(SqlValue::Text(other.to_string()));
                }
            },
            Condition::SumAtLeast {
                base_field,
                array_field,
                item_field,
                min,
            } => {
                let base = match base_field {
                    Some(f) => format!(" + COALESCE(json_extract(doc, '{}'), 0)", path(f)),
                    None => String::new(),
                };
                sql.push_str(&format!(
                    "(COALESCE((SELECT SUM(json_extract(je.value, '{}')) \
                     FROM json_each(documents.doc, '{}') AS je), 0){base}) >= ?",
                    path(item_field),
                    path(array_field),
                ));
                params.push(SqlValue::Integer(*min));
            }
        }
    }
    sql
}

impl DocumentStore for SqliteStore {
    fn get(&self, collection: &str, key: &Key, _mode: ReadMode) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .lock()?
            .query_row(
                "SELECT doc FROM documents WHERE collection = ? AND pk = ? AND sk = ?",
                rusqlite::params![collection, key.partition, sort_key(key)],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;

        match raw {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::Malformed {
                    collection: collection.to_string(),
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    fn put_if_absent(&self, collection: &str, key: &Key, doc: &Value) -> Result<PutOutcome> {
        let changed = self
            .lock()?
            .execute(
                "INSERT INTO documents (collection, pk, sk, doc) VALUES (?, ?, ?, ?)
                 ON CONFLICT (collection, pk, sk) DO NOTHING",
                rusqlite::params![collection, key.partition, sort_key(key), doc.to_string()],
            )
            .map_err(backend)?;

        Ok(if changed == 1 {
            PutOutcome::Created
        } else {
            PutOutcome::AlreadyExists
        })
    }

    fn conditional_update(
        &self,
        collection: &str,
        key: &Key,
        set: &[(&str, Value)],
        conditions: &[Condition],
    ) -> Result<WriteOutcome> {
        let mut params: Vec<SqlValue> = Vec::new();

        let mut set_sql = String::from("doc = json_set(doc");
        for (field, value) in set {
            set_sql.push_str(&format!(", '{}', json(?)", path(field)));
            params.push(SqlValue::Text(value.to_string()));
        }
        set_sql.push(')');

        params.push(SqlValue::Text(collection.to_string()));
        params.push(SqlValue::Text(key.partition.clone()));
        params.push(SqlValue::Text(sort_key(key).to_string()));

        let guard_sql = compile_conditions(conditions, &mut params);
        let sql = format!(
            "UPDATE documents SET {set_sql} \
             WHERE collection = ? AND pk = ? AND sk = ?{guard_sql}"
        );

        let changed = self
            .lock()?
            .execute(&sql, params_from_iter(params))
            .map_err(backend)?;

        Ok(if changed == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::ConditionFailed
        })
    }

    fn conditional_append(
        &self,
        collection: &str,
        key: &Key,
        array_field: &str,
        item: &Value,
        conditions: &[Condition],
    ) -> Result<WriteOutcome> {
        let mut params: Vec<SqlValue> = Vec::new();
        params.push(SqlValue::Text(item.to_string()));
        params.push(SqlValue::Text(collection.to_string()));
        params.push(SqlValue::Text(key.partition.clone()));
        params.push(SqlValue::Text(sort_key(key).to_string()));

        let guard_sql = compile_conditions(conditions, &mut params);
        let sql = format!(
            "UPDATE documents SET doc = json_insert(doc, '{}[#]', json(?)) \
             WHERE collection = ? AND pk = ? AND sk = ?{guard_sql}",
            path(array_field),
        );

        let changed = self
            .lock()?
            .execute(&sql, params_from_iter(params))
            .map_err(backend)?;

        Ok(if changed == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::ConditionFailed
        })
    }
}

//! SQLite-backed object store.
//!
//! This module is feature-gated behind `sqlite-persistence`.

use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{map_driver_err, KernelError};
use crate::meta::ObjectMeta;
use crate::selector::LabelSelector;

use super::{check_name, ObjectKind, ObjectStore, StoredObject};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS objects (
    kind TEXT NOT NULL,
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    version INTEGER NOT NULL,
    meta TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (kind, namespace, name)
);
CREATE TABLE IF NOT EXISTS store_revision (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    revision INTEGER NOT NULL
);
INSERT OR IGNORE INTO store_revision (id, revision) VALUES (1, 0);
";

pub struct SqliteObjectStore {
    conn: Mutex<Connection>,
}

impl SqliteObjectStore {
    /// Opens (or creates) the database at `path`; `:memory:` is accepted.
    pub fn new(path: &str) -> Result<Self, KernelError> {
        let conn = Connection::open(path).map_err(|e| map_driver_err("open sqlite", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| map_driver_err("schema bootstrap", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, KernelError> {
        self.conn
            .lock()
            .map_err(|_| map_driver_err("sqlite connection", "lock poisoned"))
    }
}

fn next_revision(tx: &rusqlite::Transaction<'_>) -> Result<u64, KernelError> {
    tx.execute("UPDATE store_revision SET revision = revision + 1 WHERE id = 1", [])
        .map_err(|e| map_driver_err("bump revision", e))?;
    let revision: i64 = tx
        .query_row("SELECT revision FROM store_revision WHERE id = 1", [], |row| row.get(0))
        .map_err(|e| map_driver_err("read revision", e))?;
    Ok(revision as u64)
}

fn encode(object: &StoredObject) -> Result<(String, String), KernelError> {
    let meta = serde_json::to_string(&object.meta).map_err(|e| map_driver_err("encode meta", e))?;
    let body = serde_json::to_string(&object.body).map_err(|e| map_driver_err("encode body", e))?;
    Ok((meta, body))
}

fn decode(kind: ObjectKind, version: i64, meta: &str, body: &str) -> Result<StoredObject, KernelError> {
    let mut meta: ObjectMeta =
        serde_json::from_str(meta).map_err(|e| map_driver_err("decode meta", e))?;
    meta.version = version as u64;
    let body = serde_json::from_str(body).map_err(|e| map_driver_err("decode body", e))?;
    Ok(StoredObject { kind, meta, body })
}

impl ObjectStore for SqliteObjectStore {
    fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<StoredObject, KernelError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT version, meta, body FROM objects
                 WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                params![kind.as_str(), namespace, name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| map_driver_err("get object", e))?;
        match row {
            Some((version, meta, body)) => decode(kind, version, &meta, &body),
            None => Err(KernelError::not_found(kind, namespace, name)),
        }
    }

    fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<StoredObject>, KernelError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT version, meta, body FROM objects
                 WHERE kind = ?1 AND namespace = ?2
                 ORDER BY name ASC",
            )
            .map_err(|e| map_driver_err("prepare list", e))?;
        let rows = stmt
            .query_map(params![kind.as_str(), namespace], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| map_driver_err("list objects", e))?;

        let mut objects = Vec::new();
        for row in rows {
            let (version, meta, body) = row.map_err(|e| map_driver_err("read row", e))?;
            let object = decode(kind, version, &meta, &body)?;
            if selector.matches(&object.meta.labels) {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    fn create(&self, mut object: StoredObject) -> Result<StoredObject, KernelError> {
        check_name(&object.meta)?;
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| map_driver_err("begin create tx", e))?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT version FROM objects WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                params![object.kind.as_str(), object.meta.namespace, object.meta.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| map_driver_err("check existing object", e))?;
        if exists.is_some() {
            return Err(KernelError::already_exists(
                object.kind,
                &object.meta.namespace,
                &object.meta.name,
            ));
        }

        object.meta.version = next_revision(&tx)?;
        let (meta, body) = encode(&object)?;
        tx.execute(
            "INSERT INTO objects (kind, namespace, name, version, meta, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                object.kind.as_str(),
                object.meta.namespace,
                object.meta.name,
                object.meta.version as i64,
                meta,
                body
            ],
        )
        .map_err(|e| map_driver_err("insert object", e))?;
        tx.commit()
            .map_err(|e| map_driver_err("commit create tx", e))?;
        Ok(object)
    }

    fn update(&self, mut object: StoredObject) -> Result<StoredObject, KernelError> {
        check_name(&object.meta)?;
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| map_driver_err("begin update tx", e))?;

        let expected = object.meta.version;
        let current: Option<i64> = tx
            .query_row(
                "SELECT version FROM objects WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                params![object.kind.as_str(), object.meta.namespace, object.meta.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| map_driver_err("read current version", e))?;
        match current {
            None => {
                return Err(KernelError::not_found(
                    object.kind,
                    &object.meta.namespace,
                    &object.meta.name,
                ))
            }
            Some(v) if v as u64 != expected => {
                return Err(KernelError::conflict(
                    object.kind,
                    &object.meta.namespace,
                    &object.meta.name,
                    expected,
                ))
            }
            Some(_) => {}
        }

        object.meta.version = next_revision(&tx)?;
        let (meta, body) = encode(&object)?;
        tx.execute(
            "UPDATE objects SET version = ?1, meta = ?2, body = ?3
             WHERE kind = ?4 AND namespace = ?5 AND name = ?6 AND version = ?7",
            params![
                object.meta.version as i64,
                meta,
                body,
                object.kind.as_str(),
                object.meta.namespace,
                object.meta.name,
                expected as i64
            ],
        )
        .map_err(|e| map_driver_err("update object", e))?;
        tx.commit()
            .map_err(|e| map_driver_err("commit update tx", e))?;
        Ok(object)
    }

    fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<(), KernelError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM objects WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                params![kind.as_str(), namespace, name],
            )
            .map_err(|e| map_driver_err("delete object", e))?;
        if deleted == 0 {
            return Err(KernelError::not_found(kind, namespace, name));
        }
        Ok(())
    }
}

//! Postgres-backed object store.
//!
//! This module is feature-gated behind `kernel-postgres`. Calls block on a
//! dedicated single-worker runtime so the store keeps the synchronous
//! [ObjectStore] contract.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tokio::runtime::Runtime;

use crate::error::{map_driver_err, KernelError};
use crate::meta::ObjectMeta;
use crate::selector::LabelSelector;

use super::{check_name, ObjectKind, ObjectStore, StoredObject};

/// Process-wide driver runtime shared by every Postgres store.
fn driver_runtime() -> Result<Arc<Runtime>, KernelError> {
    static RUNTIME: OnceLock<Result<Arc<Runtime>, String>> = OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .worker_threads(1)
                .thread_name("consortium-store-pg")
                .build()
                .map(Arc::new)
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(|e| map_driver_err("start postgres driver runtime", e))
}

fn decode_row(kind: ObjectKind, row: &sqlx::postgres::PgRow) -> Result<StoredObject, KernelError> {
    let version: i64 = row.get(0);
    let meta: serde_json::Value = row.get(1);
    let body: serde_json::Value = row.get(2);
    let mut meta: ObjectMeta =
        serde_json::from_value(meta).map_err(|e| map_driver_err("decode meta", e))?;
    meta.version = version as u64;
    Ok(StoredObject { kind, meta, body })
}

/// Objects live in `<schema>.objects`; versions are drawn from the
/// `<schema>.object_revision` sequence. Both are created on first use.
#[derive(Clone)]
pub struct PostgresObjectStore {
    pool: PgPool,
    schema: String,
    runtime: Arc<Runtime>,
    bootstrapped: Arc<OnceLock<Result<(), String>>>,
}

impl PostgresObjectStore {
    /// Lazily connecting store; nothing touches the database until the first
    /// call.
    pub fn connect(database_url: &str) -> Result<Self, KernelError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| map_driver_err("configure postgres pool", e))?;
        Self::with_pool(pool)
    }

    pub fn with_pool(pool: PgPool) -> Result<Self, KernelError> {
        Ok(Self {
            pool,
            schema: "public".to_string(),
            runtime: driver_runtime()?,
            bootstrapped: Arc::new(OnceLock::new()),
        })
    }

    /// Places the tables in `schema`, which must be a plain identifier.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Result<Self, KernelError> {
        let schema = schema.into();
        let plain = !schema.is_empty()
            && schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !plain {
            return Err(KernelError::validation(format!(
                "postgres schema {schema:?} must be a plain identifier"
            )));
        }
        self.schema = schema;
        self.bootstrapped = Arc::new(OnceLock::new());
        Ok(self)
    }

    fn table(&self) -> String {
        format!("\"{}\".objects", self.schema)
    }

    fn next_revision(&self) -> String {
        format!("nextval('\"{}\".object_revision')", self.schema)
    }

    /// Creates schema, table and sequence in one transaction the first time
    /// it is called, then drives `fut` to completion on the driver runtime.
    fn run<T, Fut>(&self, fut: Fut) -> Result<T, KernelError>
    where
        Fut: Future<Output = Result<T, KernelError>>,
    {
        let bootstrap = self.bootstrapped.get_or_init(|| {
            let statements = [
                format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.schema),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        kind TEXT NOT NULL,
                        namespace TEXT NOT NULL,
                        name TEXT NOT NULL,
                        version BIGINT NOT NULL,
                        meta JSONB NOT NULL,
                        body JSONB NOT NULL,
                        PRIMARY KEY (kind, namespace, name)
                    )",
                    self.table()
                ),
                format!(
                    "CREATE SEQUENCE IF NOT EXISTS \"{}\".object_revision",
                    self.schema
                ),
            ];
            self.runtime
                .block_on(async {
                    let mut tx = self.pool.begin().await?;
                    for statement in &statements {
                        sqlx::query(statement).execute(&mut *tx).await?;
                    }
                    tx.commit().await
                })
                .map_err(|e| e.to_string())
        });
        if let Err(e) = bootstrap {
            return Err(map_driver_err("bootstrap postgres schema", e));
        }
        self.runtime.block_on(fut)
    }
}

impl ObjectStore for PostgresObjectStore {
    fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<StoredObject, KernelError> {
        let sql = format!(
            "SELECT version, meta, body FROM {}
             WHERE kind = $1 AND namespace = $2 AND name = $3",
            self.table()
        );
        let row = self.run(async {
            sqlx::query(&sql)
                .bind(kind.as_str())
                .bind(namespace)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_driver_err("get object", e))
        })?;
        match row {
            Some(row) => decode_row(kind, &row),
            None => Err(KernelError::not_found(kind, namespace, name)),
        }
    }

    fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<StoredObject>, KernelError> {
        let sql = format!(
            "SELECT version, meta, body FROM {}
             WHERE kind = $1 AND namespace = $2
             ORDER BY name ASC",
            self.table()
        );
        let rows = self.run(async {
            sqlx::query(&sql)
                .bind(kind.as_str())
                .bind(namespace)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_driver_err("list objects", e))
        })?;

        let mut objects = Vec::with_capacity(rows.len());
        for row in &rows {
            let object = decode_row(kind, row)?;
            if selector.matches(&object.meta.labels) {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    fn create(&self, mut object: StoredObject) -> Result<StoredObject, KernelError> {
        check_name(&object.meta)?;
        let meta = serde_json::to_value(&object.meta).map_err(|e| map_driver_err("encode meta", e))?;
        let sql = format!(
            "INSERT INTO {} (kind, namespace, name, version, meta, body)
             VALUES ($1, $2, $3, {}, $4, $5)
             RETURNING version",
            self.table(),
            self.next_revision()
        );
        let (kind, namespace, name) = (object.kind, &object.meta.namespace, &object.meta.name);

        let version = self.run(async {
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(kind.as_str())
                .bind(namespace)
                .bind(name)
                .bind(&meta)
                .bind(&object.body)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(db) = &e {
                        if db.is_unique_violation() {
                            return KernelError::already_exists(kind, namespace, name);
                        }
                    }
                    map_driver_err("insert object", e)
                })
        })?;

        object.meta.version = version as u64;
        Ok(object)
    }

    fn update(&self, mut object: StoredObject) -> Result<StoredObject, KernelError> {
        check_name(&object.meta)?;
        let meta = serde_json::to_value(&object.meta).map_err(|e| map_driver_err("encode meta", e))?;
        let guarded = format!(
            "UPDATE {}
             SET version = {}, meta = $4, body = $5
             WHERE kind = $1 AND namespace = $2 AND name = $3 AND version = $6
             RETURNING version",
            self.table(),
            self.next_revision()
        );
        let current = format!(
            "SELECT version FROM {} WHERE kind = $1 AND namespace = $2 AND name = $3",
            self.table()
        );
        let (kind, namespace, name) = (object.kind, &object.meta.namespace, &object.meta.name);
        let expected = object.meta.version;

        let version = self.run(async {
            let updated = sqlx::query_scalar::<_, i64>(&guarded)
                .bind(kind.as_str())
                .bind(namespace)
                .bind(name)
                .bind(&meta)
                .bind(&object.body)
                .bind(expected as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_driver_err("update object", e))?;
            if let Some(version) = updated {
                return Ok(version);
            }

            let exists = sqlx::query_scalar::<_, i64>(&current)
                .bind(kind.as_str())
                .bind(namespace)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_driver_err("read current version", e))?;
            match exists {
                Some(_) => Err(KernelError::conflict(kind, namespace, name, expected)),
                None => Err(KernelError::not_found(kind, namespace, name)),
            }
        })?;

        object.meta.version = version as u64;
        Ok(object)
    }

    fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<(), KernelError> {
        let sql = format!(
            "DELETE FROM {} WHERE kind = $1 AND namespace = $2 AND name = $3",
            self.table()
        );
        let deleted = self.run(async {
            sqlx::query(&sql)
                .bind(kind.as_str())
                .bind(namespace)
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(|e| map_driver_err("delete object", e))
        })?;
        if deleted.rows_affected() == 0 {
            return Err(KernelError::not_found(kind, namespace, name));
        }
        Ok(())
    }
}

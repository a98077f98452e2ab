//! Versioned object-store contract.
//!
//! Every object carries a store-assigned version. `update` only succeeds when
//! the caller presents the version it read; otherwise it fails with
//! [KernelError::Conflict] and the caller re-reads and recomputes. Reads may be
//! stale, so nothing in the core may assume a read reflects the latest write
//! from another process.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{map_driver_err, KernelError};
use crate::meta::ObjectMeta;
use crate::selector::LabelSelector;

mod memory;
#[cfg(feature = "kernel-postgres")]
mod postgres;
#[cfg(feature = "sqlite-persistence")]
mod sqlite;

pub use memory::InMemoryObjectStore;
#[cfg(feature = "kernel-postgres")]
pub use postgres::PostgresObjectStore;
#[cfg(feature = "sqlite-persistence")]
pub use sqlite::SqliteObjectStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Job,
    Task,
    Domain,
    DomainData,
    DomainDataGrant,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Job => "Job",
            Self::Task => "Task",
            Self::Domain => "Domain",
            Self::DomainData => "DomainData",
            Self::DomainDataGrant => "DomainDataGrant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Job" => Some(Self::Job),
            "Task" => Some(Self::Task),
            "Domain" => Some(Self::Domain),
            "DomainData" => Some(Self::DomainData),
            "DomainDataGrant" => Some(Self::DomainDataGrant),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped object as held by a backend: metadata plus JSON body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub meta: ObjectMeta,
    pub body: serde_json::Value,
}

/// Change notification emitted by stores that support watching.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent {
    Added(StoredObject),
    Modified(StoredObject),
    Deleted(StoredObject),
}

impl WatchEvent {
    pub fn object(&self) -> &StoredObject {
        match self {
            Self::Added(o) | Self::Modified(o) | Self::Deleted(o) => o,
        }
    }
}

/// Backend contract used by handlers, the reconciler and the grant engine.
///
/// All calls block the caller until the backend answers.
pub trait ObjectStore: Send + Sync {
    fn get(&self, kind: ObjectKind, namespace: &str, name: &str)
        -> Result<StoredObject, KernelError>;

    /// Objects of `kind` in `namespace` whose labels match `selector`, ordered
    /// by name.
    fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<StoredObject>, KernelError>;

    /// Inserts a new object; the input version is ignored and the assigned one
    /// returned. Fails with `AlreadyExists` on a name collision.
    fn create(&self, object: StoredObject) -> Result<StoredObject, KernelError>;

    /// Replaces an object if `object.meta.version` is still current.
    fn update(&self, object: StoredObject) -> Result<StoredObject, KernelError>;

    fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<(), KernelError>;
}

/// A typed object kind persisted through an [ObjectStore].
pub trait Object: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: ObjectKind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn to_stored(&self) -> Result<StoredObject, KernelError> {
        let body = serde_json::to_value(self)
            .map_err(|e| map_driver_err(&format!("encode {}", Self::KIND), e))?;
        Ok(StoredObject {
            kind: Self::KIND,
            meta: self.meta().clone(),
            body,
        })
    }

    /// Decodes `stored`; the store's metadata wins over whatever the body holds.
    fn from_stored(stored: StoredObject) -> Result<Self, KernelError> {
        if stored.kind != Self::KIND {
            return Err(KernelError::Store(format!(
                "expected {} object, got {}",
                Self::KIND,
                stored.kind
            )));
        }
        let mut object: Self = serde_json::from_value(stored.body)
            .map_err(|e| map_driver_err(&format!("decode {}", Self::KIND), e))?;
        *object.meta_mut() = stored.meta;
        Ok(object)
    }
}

/// Typed access on top of any [ObjectStore].
pub trait TypedObjectStore {
    fn get_as<T: Object>(&self, namespace: &str, name: &str) -> Result<T, KernelError>;

    fn list_as<T: Object>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<T>, KernelError>;

    fn create_as<T: Object>(&self, object: &T) -> Result<T, KernelError>;

    fn update_as<T: Object>(&self, object: &T) -> Result<T, KernelError>;

    fn delete_as<T: Object>(&self, namespace: &str, name: &str) -> Result<(), KernelError>;
}

impl<S: ObjectStore + ?Sized> TypedObjectStore for S {
    fn get_as<T: Object>(&self, namespace: &str, name: &str) -> Result<T, KernelError> {
        T::from_stored(self.get(T::KIND, namespace, name)?)
    }

    fn list_as<T: Object>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<T>, KernelError> {
        self.list(T::KIND, namespace, selector)?
            .into_iter()
            .map(T::from_stored)
            .collect()
    }

    fn create_as<T: Object>(&self, object: &T) -> Result<T, KernelError> {
        T::from_stored(self.create(object.to_stored()?)?)
    }

    fn update_as<T: Object>(&self, object: &T) -> Result<T, KernelError> {
        T::from_stored(self.update(object.to_stored()?)?)
    }

    fn delete_as<T: Object>(&self, namespace: &str, name: &str) -> Result<(), KernelError> {
        self.delete(T::KIND, namespace, name)
    }
}

fn check_name(meta: &ObjectMeta) -> Result<(), KernelError> {
    if meta.name.is_empty() {
        return Err(KernelError::validation("object name can't be empty"));
    }
    Ok(())
}

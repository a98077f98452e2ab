//! In-process store with a watch channel; the default backend for tests and
//! single-node deployments.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::error::{map_driver_err, KernelError};
use crate::selector::LabelSelector;

use super::{check_name, ObjectKind, ObjectStore, StoredObject, WatchEvent};

const WATCH_CAPACITY: usize = 1024;

type ObjectKey = (ObjectKind, String, String);

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<ObjectKey, StoredObject>,
    /// Store-wide revision; versions never repeat, even across delete/recreate.
    revision: u64,
}

pub struct InMemoryObjectStore {
    state: RwLock<MemoryState>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: RwLock::new(MemoryState::default()),
            events,
        }
    }

    /// Subscribes to every change committed after this call.
    pub fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: WatchEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn key(kind: ObjectKind, namespace: &str, name: &str) -> ObjectKey {
        (kind, namespace.to_string(), name.to_string())
    }
}

fn poisoned() -> KernelError {
    map_driver_err("in-memory store", "lock poisoned")
}

impl ObjectStore for InMemoryObjectStore {
    fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<StoredObject, KernelError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .objects
            .get(&Self::key(kind, namespace, name))
            .cloned()
            .ok_or_else(|| KernelError::not_found(kind, namespace, name))
    }

    fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<StoredObject>, KernelError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .map(|(_, object)| object)
            .filter(|object| selector.matches(&object.meta.labels))
            .cloned()
            .collect())
    }

    fn create(&self, mut object: StoredObject) -> Result<StoredObject, KernelError> {
        check_name(&object.meta)?;
        let created = {
            let mut state = self.state.write().map_err(|_| poisoned())?;
            let key = Self::key(object.kind, &object.meta.namespace, &object.meta.name);
            if state.objects.contains_key(&key) {
                return Err(KernelError::already_exists(
                    object.kind,
                    &object.meta.namespace,
                    &object.meta.name,
                ));
            }
            state.revision += 1;
            object.meta.version = state.revision;
            state.objects.insert(key, object.clone());
            object
        };
        self.publish(WatchEvent::Added(created.clone()));
        Ok(created)
    }

    fn update(&self, mut object: StoredObject) -> Result<StoredObject, KernelError> {
        check_name(&object.meta)?;
        let updated = {
            let mut state = self.state.write().map_err(|_| poisoned())?;
            let key = Self::key(object.kind, &object.meta.namespace, &object.meta.name);
            let current_version = match state.objects.get(&key) {
                Some(current) => current.meta.version,
                None => {
                    return Err(KernelError::not_found(
                        object.kind,
                        &object.meta.namespace,
                        &object.meta.name,
                    ))
                }
            };
            if current_version != object.meta.version {
                return Err(KernelError::conflict(
                    object.kind,
                    &object.meta.namespace,
                    &object.meta.name,
                    object.meta.version,
                ));
            }
            state.revision += 1;
            object.meta.version = state.revision;
            state.objects.insert(key, object.clone());
            object
        };
        self.publish(WatchEvent::Modified(updated.clone()));
        Ok(updated)
    }

    fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<(), KernelError> {
        let removed = {
            let mut state = self.state.write().map_err(|_| poisoned())?;
            state
                .objects
                .remove(&Self::key(kind, namespace, name))
                .ok_or_else(|| KernelError::not_found(kind, namespace, name))?
        };
        self.publish(WatchEvent::Deleted(removed));
        Ok(())
    }
}

//! Optimistic-concurrency read-modify-write.

use tracing::debug;

use consortium_kernel::{KernelError, Object, ObjectStore, TypedObjectStore};

/// Outcome of [update_with_retry].
#[derive(Clone, Debug)]
pub struct Updated<T> {
    /// The persisted object, or the last read when nothing changed.
    pub object: T,
    pub changed: bool,
    pub attempts: u32,
}

/// Reads `namespace/name`, applies `mutate`, and writes the result back with
/// the read version. `mutate` returns whether it changed anything; when it
/// returns `false` nothing is written.
///
/// A version conflict re-reads and re-applies `mutate` on the fresh copy, so
/// `mutate` must derive its change from the object it is handed. After
/// `max_attempts` conflicting writes the last conflict is returned. Every
/// other error, including one raised by `mutate`, is returned as-is.
pub fn update_with_retry<T, F>(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
    max_attempts: u32,
    mut mutate: F,
) -> Result<Updated<T>, KernelError>
where
    T: Object,
    F: FnMut(&mut T) -> Result<bool, KernelError>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let mut object: T = store.get_as(namespace, name)?;
        if !mutate(&mut object)? {
            return Ok(Updated {
                object,
                changed: false,
                attempts,
            });
        }
        match store.update_as(&object) {
            Ok(object) => {
                return Ok(Updated {
                    object,
                    changed: true,
                    attempts,
                })
            }
            Err(e) if e.is_conflict() && attempts < max_attempts => {
                debug!(
                    kind = %T::KIND,
                    namespace,
                    name,
                    attempt = attempts,
                    "version conflict; re-reading"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

//! A thread-safe holder for the currently active [`ConfigSnapshot`].
use std::sync::{Arc, RwLock};

use crate::snapshot::ConfigSnapshot;

/// `SnapshotStore` provides a thread-safe (`Sync`) slot for the active snapshot that allows
/// concurrent access for readers and a writer.
///
/// The snapshot itself is immutable and can only be replaced completely. Locks are held only long
/// enough to clone or replace the `Arc`, never while building or evaluating.
#[derive(Debug)]
pub struct SnapshotStore {
    snapshot: RwLock<Arc<ConfigSnapshot>>,
}

impl SnapshotStore {
    /// Create a store holding `snapshot`.
    pub fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
        SnapshotStore {
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Get the currently active snapshot.
    pub fn get_snapshot(&self) -> Arc<ConfigSnapshot> {
        // self.snapshot.read() should always return Ok(). Err() is possible only if the lock is
        // poisoned (writer panicked while holding the lock), which should never happen.
        let snapshot = self
            .snapshot
            .read()
            .expect("thread holding snapshot lock should not panic");

        Arc::clone(&snapshot)
    }

    /// Set a new snapshot, returning the previous one.
    pub fn set_snapshot(&self, snapshot: Arc<ConfigSnapshot>) -> Arc<ConfigSnapshot> {
        let mut slot = self
            .snapshot
            .write()
            .expect("thread holding snapshot lock should not panic");

        std::mem::replace(&mut *slot, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SnapshotStore;
    use crate::{builder::tests::rows, snapshot::ConfigSnapshot};

    #[test]
    fn can_set_snapshot_from_another_thread() {
        let empty = Arc::new(ConfigSnapshot::build(&rows(&[], &[])).unwrap());
        let store = Arc::new(SnapshotStore::new(empty));

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                let snapshot = ConfigSnapshot::build(&rows(&[("signup", "1")], &[])).unwrap();
                store.set_snapshot(Arc::new(snapshot));
            })
            .join();
        }

        assert_eq!(store.get_snapshot().layer_count(), 1);
    }

    #[test]
    fn replaced_snapshot_stays_valid_for_holders() {
        let first = Arc::new(ConfigSnapshot::build(&rows(&[("signup", "1")], &[])).unwrap());
        let store = SnapshotStore::new(first.clone());

        let held = store.get_snapshot();
        let second = Arc::new(ConfigSnapshot::build(&rows(&[], &[])).unwrap());
        let previous = store.set_snapshot(second);

        assert!(Arc::ptr_eq(&previous, &first));
        assert_eq!(held.layer_count(), 1);
        assert_eq!(store.get_snapshot().layer_count(), 0);
    }
}

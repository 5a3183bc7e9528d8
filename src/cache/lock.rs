use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    store: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        report_poisoned(store, op, "rwlock.read");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    store: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        report_poisoned(store, op, "rwlock.write");
        poisoned.into_inner()
    })
}

fn report_poisoned(store: &'static str, op: &'static str, lock_kind: &'static str) {
    warn!(
        op,
        store,
        lock_kind,
        result = "poisoned_recovered",
        hint = "entries may be stale after a panic in another pipeline",
        "Recovered from poisoned cache store lock"
    );
}

//! Per-project read-write locks.
//!
//! Every engine operation holds its project's lock for the whole logical
//! operation: shared for reads, exclusive for anything that touches the
//! working tree or refs. Locks for different projects are independent.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::project::ProjectId;

/// Handle to one project's lock.
type ProjectLock = Arc<RwLock<()>>;

/// Lock table keyed by project ID.
///
/// Entries live only while some operation holds or waits on them, so the
/// table never outgrows the set of projects currently in use.
#[derive(Debug, Default)]
pub struct ProjectLocks {
    table: Mutex<HashMap<ProjectId, ProjectLock>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` holding the shared lock of `id`.
    pub fn with_read<T>(&self, id: &ProjectId, f: impl FnOnce() -> T) -> T {
        let handle = self.acquire(id);
        let result = {
            let _guard = handle.read();
            f()
        };
        self.release(id, handle);
        result
    }

    /// Run `f` holding the exclusive lock of `id`.
    pub fn with_write<T>(&self, id: &ProjectId, f: impl FnOnce() -> T) -> T {
        let handle = self.acquire(id);
        let result = {
            let _guard = handle.write();
            f()
        };
        self.release(id, handle);
        result
    }

    /// Number of projects with an operation in flight.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn acquire(&self, id: &ProjectId) -> ProjectLock {
        let mut table = self.table.lock();
        table
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Drop the table entry once nobody but the table refers to it.
    ///
    /// Handles are only cloned under the table mutex, so the strong count
    /// seen here cannot grow behind our back.
    fn release(&self, id: &ProjectId, handle: ProjectLock) {
        let mut table = self.table.lock();
        let idle = table
            .get(id)
            .is_some_and(|held| Arc::ptr_eq(held, &handle) && Arc::strong_count(&handle) == 2);
        if idle {
            table.remove(id);
        }
    }
}

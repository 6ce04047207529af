use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::TransferId;

const LOG_PREFIX: &str = "[registry]";

/// Live transfers of one host, keyed by id.
///
/// Entries are weak: the registry never keeps a transfer alive on its own,
/// and a transfer whose consumer is gone is treated as absent even before
/// its entry is removed.
pub struct SessionRegistry<S> {
    sessions: RwLock<HashMap<TransferId, Weak<S>>>,
}

impl<S> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<TransferId, Weak<S>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<TransferId, Weak<S>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, id: TransferId, session: &Arc<S>) {
        let previous = self.write_map().insert(id, Arc::downgrade(session));
        if previous.is_some() {
            log::warn!("{} replaced existing entry for {}", LOG_PREFIX, id);
        }
        log::trace!("{} added {}", LOG_PREFIX, id);
    }

    /// Removes the entry for `id`. Absent ids are ignored; returns whether
    /// an entry was removed.
    pub fn remove(&self, id: &TransferId) -> bool {
        let removed = self.write_map().remove(id).is_some();
        if removed {
            log::trace!("{} removed {}", LOG_PREFIX, id);
        }
        removed
    }

    pub fn try_get(&self, id: &TransferId) -> Option<Arc<S>> {
        self.read_map().get(id).and_then(Weak::upgrade)
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids with an entry, including transfers whose consumer is already
    /// gone but whose entry has not been removed yet.
    pub fn ids(&self) -> Vec<TransferId> {
        self.read_map().keys().copied().collect()
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

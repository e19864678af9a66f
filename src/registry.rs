// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Connection registry: the arena+index alternative to a raw context
//! pointer described in spec.md §9 ("Back-references in callbacks").
//!
//! `msquic` callbacks receive an opaque `void*` the caller chose at
//! `ConnectionOpen` time; if the shim has already decided to drop that
//! connection, the callback fires against dangling memory unless the
//! caller is careful. This crate's spawned Tokio tasks instead hold a
//! [`Weak`] reference obtained through this registry: a callback that
//! fires after the connection is gone just finds nothing to upgrade, and
//! becomes a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, Weak};

use crate::connection::ConnectionInner;

/// Small integer handle identifying a connection in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn table() -> &'static Mutex<HashMap<ConnectionId, Weak<ConnectionInner>>> {
    static TABLE: OnceLock<Mutex<HashMap<ConnectionId, Weak<ConnectionInner>>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a connection, returning the id its spawned tasks should use to
/// look it up.
pub(crate) fn register(inner: &std::sync::Arc<ConnectionInner>) -> ConnectionId {
    let id = ConnectionId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    table()
        .lock()
        .unwrap()
        .insert(id, std::sync::Arc::downgrade(inner));
    id
}

/// Look up a connection by id, returning `None` if it has already been
/// dropped — the caller should treat that as "the callback is a no-op".
pub(crate) fn lookup(id: ConnectionId) -> Option<std::sync::Arc<ConnectionInner>> {
    table().lock().unwrap().get(&id).and_then(Weak::upgrade)
}

/// Remove a connection's entry once it has reached a terminal state.
pub(crate) fn unregister(id: ConnectionId) {
    table().lock().unwrap().remove(&id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionInner;
    use std::sync::Arc;

    #[test]
    fn lookup_after_drop_returns_none() {
        let id = {
            let inner = Arc::new(ConnectionInner::new_for_test());
            let id = register(&inner);
            assert!(lookup(id).is_some());
            id
            // `inner` dropped here; only the registry's Weak remains.
        };
        assert!(lookup(id).is_none());
    }

    #[test]
    fn unregister_drops_the_entry_even_if_the_arc_is_still_alive() {
        let inner = Arc::new(ConnectionInner::new_for_test());
        let id = register(&inner);
        unregister(id);
        assert!(lookup(id).is_none());
    }
}

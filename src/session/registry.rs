//! Session registry: authoritative map from session key to the agents
//! currently holding that session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::Client;

/// Registry of active sessions and their connected agents.
///
/// A single mutex guards the whole map; bucket edits are atomic, which makes
/// the per-session connection cap check the tie-break for racing
/// registrations. A bucket never exists with zero agents.
pub struct SessionRegistry {
    /// Per-session connection cap; 0 means unlimited.
    max_conns: usize,
    buckets: Mutex<HashMap<String, Vec<Arc<Client>>>>,
}

impl SessionRegistry {
    pub(crate) fn new(max_conns: usize) -> Self {
        Self {
            max_conns,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The configured per-session connection cap (0 = unlimited).
    #[inline]
    pub fn max_conns(&self) -> usize {
        self.max_conns
    }

    /// Insert an agent into the bucket for `key`.
    ///
    /// Returns `false` if the bucket is already at the cap; when two agents
    /// race for the last slot exactly one wins.
    pub(crate) fn register(&self, key: &str, client: Arc<Client>) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_owned()).or_default();
        // A rejection can only hit an occupied bucket (a fresh bucket is
        // below any positive cap), so no empty bucket is ever left behind.
        if self.max_conns > 0 && bucket.len() >= self.max_conns {
            return false;
        }
        bucket.push(client);
        true
    }

    /// Remove an agent from the bucket for `key`, dropping the bucket when
    /// it empties. Returns whether the agent was present.
    pub(crate) fn deregister(&self, key: &str, client: &Arc<Client>) -> bool {
        let mut buckets = self.buckets.lock();
        let Some(bucket) = buckets.get_mut(key) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|held| !Arc::ptr_eq(held, client));
        let removed = bucket.len() < before;
        if bucket.is_empty() {
            buckets.remove(key);
        }
        removed
    }

    /// Number of agents currently connected under `key`.
    pub fn session_connections(&self, key: &str) -> usize {
        self.buckets.lock().get(key).map_or(0, Vec::len)
    }

    /// Number of distinct sessions with at least one connected agent.
    pub fn active_sessions(&self) -> usize {
        self.buckets.lock().len()
    }
}

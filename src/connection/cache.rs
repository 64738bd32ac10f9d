//! Database handle cache scoped to one connection identity.
//!
//! Handles are driver `Database` values bound to the client that created
//! them; they must never be reused across a different client even when the
//! name and options match, or operations would silently route through a
//! stale, possibly-closed connection. The cache is therefore owned by the
//! connection manager's active-connection value and replaced wholesale on
//! every swap instead of being scrubbed entry by entry.

use std::collections::HashMap;

use mongodb::Database;

/// Cache key: database name plus the deterministic signature of its
/// option set (see [`db_options_signature`](crate::options::db_options_signature)).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandleKey {
    name: String,
    signature: String,
}

/// Maps `(database name, option signature)` to a previously constructed
/// database handle for one connection identity.
#[derive(Default)]
pub(crate) struct HandleCache {
    entries: HashMap<HandleKey, Database>,
}

impl HandleCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up a handle for the exact `(name, signature)` key.
    pub(crate) fn get(&self, name: &str, signature: &str) -> Option<Database> {
        let key = HandleKey {
            name: name.to_string(),
            signature: signature.to_string(),
        };
        self.entries.get(&key).cloned()
    }

    /// Store a handle under `(name, signature)`.
    pub(crate) fn insert(&mut self, name: &str, signature: &str, database: Database) {
        let key = HandleKey {
            name: name.to_string(),
            signature: signature.to_string(),
        };
        self.entries.insert(key, database);
    }

    /// Drop all entries; used when the owning connection closes.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached handles.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

//! Per-call option layering for provider operations.
//!
//! Every operation's effective options are the shallow, key-by-key merge of
//! three layers, left to right:
//!
//! 1. process-wide fixed defaults ([`DEFAULT_BASE_OPTIONS`])
//! 2. connection-wide command defaults (mutable only through an explicit
//!    administrative action)
//! 3. the call-specific options supplied by the caller
//!
//! The merge never mutates the caller-supplied document and never mutates
//! the connection-wide defaults; concurrent administrative changes cannot be
//! observed mid-merge because the defaults are snapshotted under a lock
//! before merging starts.

pub mod convert;

use std::fmt::Write as _;
use std::sync::RwLock;

use bson::{Bson, Document, doc};

/// Deprecated find flags accepted for compatibility with older shell
/// scripts, paired with the modern key the driver understands.
///
/// `partial` predates `allowPartialResults`, `timeout` predates
/// `noCursorTimeout`. The rewrite happens after the merge, only when the
/// modern key was not supplied explicitly, and the deprecated key never
/// reaches the driver.
const LEGACY_FLAG_REWRITES: [(&str, &str); 2] = [
    ("partial", "allowPartialResults"),
    ("timeout", "noCursorTimeout"),
];

/// Process-wide fixed defaults applied to every operation.
pub fn default_base_options() -> Document {
    doc! { "serializeFunctions": true }
}

/// Combines the three option layers into one effective option set per call.
pub struct OptionMerger {
    /// Layer 1: process-wide fixed defaults.
    process_defaults: Document,

    /// Layer 2: connection-wide command defaults for the current session.
    connection_defaults: RwLock<Document>,
}

impl OptionMerger {
    /// Create a merger with the process defaults and empty connection
    /// defaults.
    pub fn new() -> Self {
        Self {
            process_defaults: default_base_options(),
            connection_defaults: RwLock::new(Document::new()),
        }
    }

    /// Merge the caller's options over the two default layers.
    ///
    /// Later layers override earlier ones key by key; the caller's document
    /// is cloned, never mutated. Legacy flags are rewritten on the merged
    /// result.
    pub fn merge(&self, call_options: &Document) -> Document {
        let mut effective = self.process_defaults.clone();

        // Snapshot under the read lock so a concurrent administrative
        // change cannot be observed mid-merge.
        let snapshot = self
            .connection_defaults
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (key, value) in snapshot {
            effective.insert(key, value);
        }
        for (key, value) in call_options {
            effective.insert(key.clone(), value.clone());
        }

        rewrite_legacy_flags(&mut effective);
        effective
    }

    /// Replace the connection-wide command defaults.
    ///
    /// Only reachable through the provider's administrative surface.
    pub fn set_connection_defaults(&self, defaults: Document) {
        *self
            .connection_defaults
            .write()
            .unwrap_or_else(|e| e.into_inner()) = defaults;
    }

    /// Snapshot of the current connection-wide command defaults.
    pub fn connection_defaults(&self) -> Document {
        self.connection_defaults
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for OptionMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite deprecated flags to their modern equivalents in place.
///
/// The deprecated key is always removed; its value is carried over only
/// when the modern key is absent, so an explicit modern flag wins.
pub fn rewrite_legacy_flags(options: &mut Document) {
    for (deprecated, modern) in LEGACY_FLAG_REWRITES {
        if let Some(value) = options.remove(deprecated) {
            if !options.contains_key(modern) {
                options.insert(modern, value);
            }
        }
    }
}

/// Deterministic, order-independent signature of a db-option set.
///
/// Keys are sorted recursively before rendering, so `{a: 1, b: 2}` and
/// `{b: 2, a: 1}` collapse to the same handle-cache entry.
pub fn db_options_signature(options: &Document) -> String {
    let canonical = canonicalize(options);
    let mut signature = String::new();
    for (key, value) in &canonical {
        let _ = write!(signature, "{key}={value};");
    }
    signature
}

/// Recursively sort a document's keys.
fn canonicalize(options: &Document) -> Document {
    let mut keys: Vec<&String> = options.keys().collect();
    keys.sort();

    let mut sorted = Document::new();
    for key in keys {
        match options.get(key) {
            Some(Bson::Document(inner)) => {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Some(value) => {
                sorted.insert(key.clone(), value.clone());
            }
            None => {}
        }
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_precedence_call_over_connection_over_process() {
        let merger = OptionMerger::new();
        merger.set_connection_defaults(doc! { "serializeFunctions": false, "maxTimeMS": 500 });

        let effective = merger.merge(&doc! { "maxTimeMS": 100 });

        // Call layer wins.
        assert_eq!(effective.get_i32("maxTimeMS").unwrap(), 100);
        // Connection layer overrides the process default.
        assert!(!effective.get_bool("serializeFunctions").unwrap());
    }

    #[test]
    fn test_merge_falls_back_through_layers() {
        let merger = OptionMerger::new();
        merger.set_connection_defaults(doc! { "readConcern": { "level": "majority" } });

        let effective = merger.merge(&doc! {});

        assert!(effective.get_bool("serializeFunctions").unwrap());
        assert_eq!(
            effective.get_document("readConcern").unwrap(),
            &doc! { "level": "majority" }
        );
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let merger = OptionMerger::new();
        merger.set_connection_defaults(doc! { "maxTimeMS": 500 });
        let call = doc! { "partial": true };

        let effective = merger.merge(&call);

        // Caller's document untouched, including the deprecated flag.
        assert_eq!(call, doc! { "partial": true });
        // Connection defaults untouched by the merge.
        assert_eq!(merger.connection_defaults(), doc! { "maxTimeMS": 500 });
        assert!(effective.get_bool("allowPartialResults").unwrap());
    }

    #[test]
    fn test_legacy_partial_flag_rewritten() {
        let mut options = doc! { "partial": true };
        rewrite_legacy_flags(&mut options);

        assert!(!options.contains_key("partial"));
        assert!(options.get_bool("allowPartialResults").unwrap());
    }

    #[test]
    fn test_legacy_timeout_flag_rewritten() {
        let mut options = doc! { "timeout": false };
        rewrite_legacy_flags(&mut options);

        assert!(!options.contains_key("timeout"));
        assert!(!options.get_bool("noCursorTimeout").unwrap());
    }

    #[test]
    fn test_explicit_modern_flag_wins_over_deprecated() {
        let mut options = doc! { "partial": true, "allowPartialResults": false };
        rewrite_legacy_flags(&mut options);

        assert!(!options.contains_key("partial"));
        assert!(!options.get_bool("allowPartialResults").unwrap());
    }

    #[test]
    fn test_signature_is_order_independent() {
        let a = doc! { "readConcern": { "level": "local" }, "retryWrites": true };
        let b = doc! { "retryWrites": true, "readConcern": { "level": "local" } };

        assert_eq!(db_options_signature(&a), db_options_signature(&b));
    }

    #[test]
    fn test_signature_distinguishes_different_values() {
        let a = doc! { "readConcern": { "level": "local" } };
        let b = doc! { "readConcern": { "level": "majority" } };

        assert_ne!(db_options_signature(&a), db_options_signature(&b));
    }

    #[test]
    fn test_signature_sorts_nested_documents() {
        let a = doc! { "writeConcern": { "w": 1, "j": true } };
        let b = doc! { "writeConcern": { "j": true, "w": 1 } };

        assert_eq!(db_options_signature(&a), db_options_signature(&b));
    }
}

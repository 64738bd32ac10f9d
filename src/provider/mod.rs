//! The service provider contract.
//!
//! This is the stable, driver-independent surface the shell's
//! command-interpretation layer programs against. It is split the way the
//! operations split: [`ReadProvider`] for queries and introspection,
//! [`WriteProvider`] for document mutation, [`AdminProvider`] for
//! collection/database administration and connection lifecycle. The
//! umbrella [`ServiceProvider`] trait is what consumers name.
//!
//! Every operation takes its options as a plain BSON document (the
//! caller's layer of the three-layer merge) plus an optional db-option
//! document that participates in handle caching. Return values are either
//! driver-native (cursors, write results, change streams) or one of the
//! fixed normalization shapes defined here.

pub mod bulk;
pub mod cli;

use async_trait::async_trait;
use bson::{Bson, Document};
use mongodb::change_stream::ChangeStream;
use mongodb::change_stream::event::ChangeStreamEvent;
use mongodb::options::{ReadConcern, SelectionCriteria, UpdateModifications, WriteConcern};
use mongodb::results::{
    DeleteResult, InsertManyResult, InsertOneResult, SummaryBulkWriteResult, UpdateResult,
};
use mongodb::{Client, Cursor};
use serde::{Deserialize, Serialize};

use crate::connection::AuthOptions;
use crate::error::{CommandFailedError, Result};

pub use bulk::{BulkOp, BulkOpBuilder};
pub use cli::CliServiceProvider;

/// Minimal acknowledgment for operations whose driver-level return shape
/// (void, a handle) is deliberately not exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub ok: i32,
}

impl CommandAck {
    /// The `{ok: 1}` acknowledgment.
    pub fn ok() -> Self {
        Self { ok: 1 }
    }
}

/// Structured result of `dropDatabase`, replacing the driver's bare
/// success indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropDatabaseResult {
    pub ok: i32,

    /// Name of the dropped database; present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped: Option<String>,
}

/// Convert a driver-level success indicator into the stable
/// `dropDatabase` result shape.
pub(crate) fn normalize_drop_database(database: &str, success: bool) -> DropDatabaseResult {
    if success {
        DropDatabaseResult {
            ok: 1,
            dropped: Some(database.to_string()),
        }
    } else {
        DropDatabaseResult { ok: 0, dropped: None }
    }
}

/// Whether a command reply's `ok` field indicates success.
///
/// Servers report `ok` as a double, older tooling as an int; treat any
/// nonzero numeric as success and a missing field as success (replies
/// without `ok` are handled by driver-level errors instead).
pub(crate) fn command_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(v)) => *v != 0.0,
        Some(Bson::Int32(v)) => *v != 0,
        Some(Bson::Int64(v)) => *v != 0,
        Some(Bson::Boolean(v)) => *v,
        _ => true,
    }
}

/// Turn an `ok: 0` reply into [`CommandFailedError`] carrying the original
/// command spec; pass successful replies through unchanged.
pub(crate) fn check_command_reply(spec: &Document, reply: Document) -> Result<Document> {
    if command_ok(&reply) {
        return Ok(reply);
    }

    let command = serde_json::to_string(spec).unwrap_or_else(|_| format!("{spec}"));
    Err(CommandFailedError {
        command,
        errmsg: reply.get_str("errmsg").ok().map(str::to_string),
    }
    .into())
}

/// Query and introspection operations.
#[async_trait]
pub trait ReadProvider: Send + Sync {
    /// Find documents; returns the driver's lazy cursor.
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Cursor<Document>>;

    /// Deprecated count, retained for older shell scripts. Delegates to
    /// [`ReadProvider::count_documents`].
    async fn count(
        &self,
        database: &str,
        collection: &str,
        query: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<u64>;

    /// Exact document count.
    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<u64>;

    /// Metadata-based document count estimate.
    async fn estimated_document_count(
        &self,
        database: &str,
        collection: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<u64>;

    /// Distinct values of a field.
    async fn distinct(
        &self,
        database: &str,
        collection: &str,
        field_name: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Vec<Bson>>;

    /// Collection-scoped aggregation.
    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Cursor<Document>>;

    /// Database-scoped aggregation (e.g. `$currentOp` pipelines).
    async fn aggregate_db(
        &self,
        database: &str,
        pipeline: Vec<Document>,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Cursor<Document>>;

    /// Index descriptions for a collection, as plain documents.
    async fn get_indexes(
        &self,
        database: &str,
        collection: &str,
        db_options: Option<Document>,
    ) -> Result<Vec<Document>>;

    /// Collection infos matching `filter`.
    async fn list_collections(
        &self,
        database: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Vec<Document>>;

    /// The `listDatabases` reply.
    async fn list_databases(&self, options: Document) -> Result<Document>;

    /// Whether the collection is capped.
    async fn is_capped(
        &self,
        database: &str,
        collection: &str,
        db_options: Option<Document>,
    ) -> Result<bool>;

    /// Collection statistics (`collStats`).
    async fn stats(
        &self,
        database: &str,
        collection: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Document>;

    /// Run a raw command against a database.
    async fn run_command(
        &self,
        database: &str,
        spec: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Document>;

    /// Run a raw command and fail with
    /// [`CommandFailedError`](crate::error::CommandFailedError) when the
    /// reply carries `ok: 0`.
    async fn run_command_with_check(
        &self,
        database: &str,
        spec: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Document>;

    /// Open a change-notification subscription.
    ///
    /// Scope is selected by which of `database` / `collection` are
    /// supplied: neither → deployment, database only → database, both →
    /// collection. A collection without a database is rejected with
    /// [`ProviderError::InvalidArgument`](crate::error::ProviderError).
    async fn watch(
        &self,
        pipeline: Vec<Document>,
        options: Document,
        db_options: Document,
        database: Option<&str>,
        collection: Option<&str>,
    ) -> Result<ChangeStream<ChangeStreamEvent<Document>>>;

    /// The active client's read preference, if any.
    async fn read_preference(&self) -> Option<SelectionCriteria>;

    /// The active client's read concern, if any.
    async fn read_concern(&self) -> Option<ReadConcern>;
}

/// Document mutation operations.
#[async_trait]
pub trait WriteProvider: Send + Sync {
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<InsertOneResult>;

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<InsertManyResult>;

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<UpdateResult>;

    async fn update_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<UpdateResult>;

    async fn replace_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<UpdateResult>;

    async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<DeleteResult>;

    async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<DeleteResult>;

    /// Deprecated remove, retained for older shell scripts. Delegates to
    /// [`WriteProvider::delete_many`].
    async fn remove(
        &self,
        database: &str,
        collection: &str,
        query: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<DeleteResult>;

    async fn find_one_and_delete(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Option<Document>>;

    async fn find_one_and_replace(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Option<Document>>;

    async fn find_one_and_update(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Option<Document>>;

    /// Execute a one-shot batch of write operations.
    async fn bulk_write(
        &self,
        database: &str,
        collection: &str,
        requests: Vec<BulkOp>,
        ordered: bool,
        options: Document,
    ) -> Result<SummaryBulkWriteResult>;

    /// Create a caller-managed bulk builder bound to
    /// `(database, collection, ordering mode)`. The mode is fixed for the
    /// builder's lifetime.
    async fn initialize_bulk_op(
        &self,
        database: &str,
        collection: &str,
        ordered: bool,
        options: Document,
    ) -> Result<BulkOpBuilder>;

    /// The active client's write concern, if any.
    async fn write_concern(&self) -> Option<WriteConcern>;
}

/// Administration and connection lifecycle operations.
#[async_trait]
pub trait AdminProvider: Send + Sync {
    /// Create a collection; normalized to `{ok: 1}`.
    async fn create_collection(
        &self,
        database: &str,
        collection: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<CommandAck>;

    /// Create indexes from `{key, name?, unique?, ...}` specs; returns the
    /// created index names.
    async fn create_indexes(
        &self,
        database: &str,
        collection: &str,
        index_specs: Vec<Document>,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Vec<String>>;

    /// Drop a collection; `true` on success.
    async fn drop_collection(
        &self,
        database: &str,
        collection: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<bool>;

    /// Drop a database; see [`DropDatabaseResult`].
    async fn drop_database(
        &self,
        database: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<DropDatabaseResult>;

    /// Rename a collection within a database; returns the checked command
    /// reply. Issued against `admin`, so no per-database options apply.
    async fn rename_collection(
        &self,
        database: &str,
        old_name: &str,
        new_name: &str,
        drop_target: bool,
    ) -> Result<Document>;

    /// Re-authenticate by swapping in a new client built from the original
    /// connection options with only the credentials replaced; normalized
    /// to `{ok: 1}`.
    async fn authenticate(&self, auth: &AuthOptions) -> Result<CommandAck>;

    /// Replace the active client with one using different connection-level
    /// options, merged over the original options; normalized to `{ok: 1}`.
    async fn reset_connection_options(&self, partial: Document) -> Result<CommandAck>;

    /// Replace the connection-wide command defaults (the middle layer of
    /// the option merge).
    fn set_command_defaults(&self, defaults: Document);

    /// Close the active connection. `force` skips graceful draining.
    async fn close(&self, force: bool) -> Result<()>;

    /// Driver-native client access; an explicit escape hatch for
    /// collaborators like encryption helpers.
    async fn get_raw_client(&self) -> Client;
}

/// The full provider contract consumed by the shell layer.
pub trait ServiceProvider: ReadProvider + WriteProvider + AdminProvider {}

impl<T: ReadProvider + WriteProvider + AdminProvider> ServiceProvider for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use crate::error::ProviderError;

    #[test]
    fn test_command_ok_accepts_numeric_shapes() {
        assert!(command_ok(&doc! { "ok": 1.0 }));
        assert!(command_ok(&doc! { "ok": 1 }));
        assert!(!command_ok(&doc! { "ok": 0.0 }));
        assert!(!command_ok(&doc! { "ok": 0 }));
        assert!(command_ok(&doc! { "values": [] }));
    }

    #[test]
    fn test_check_command_reply_passes_success_through_unchanged() {
        let reply = doc! { "ok": 1.0, "n": 3 };
        let checked = check_command_reply(&doc! { "count": "users" }, reply.clone()).unwrap();
        assert_eq!(checked, reply);
    }

    #[test]
    fn test_check_command_reply_carries_spec_and_errmsg() {
        let spec = doc! { "collStats": "users" };
        let result = check_command_reply(&spec, doc! { "ok": 0, "errmsg": "x" });

        match result {
            Err(ProviderError::CommandFailed(err)) => {
                assert!(err.command.contains("collStats"));
                assert_eq!(err.errmsg.as_deref(), Some("x"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_database_normalization() {
        assert_eq!(
            normalize_drop_database("mydb", true),
            DropDatabaseResult {
                ok: 1,
                dropped: Some("mydb".to_string())
            }
        );

        let failed = normalize_drop_database("mydb", false);
        assert_eq!(failed, DropDatabaseResult { ok: 0, dropped: None });
        // The serialized shape has no `dropped` key on failure.
        let json = serde_json::to_string(&failed).unwrap();
        assert_eq!(json, r#"{"ok":0}"#);
    }

    #[test]
    fn test_command_ack_shape() {
        let json = serde_json::to_string(&CommandAck::ok()).unwrap();
        assert_eq!(json, r#"{"ok":1}"#);
    }
}

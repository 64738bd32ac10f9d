//! Query and introspection operations.

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::IndexModel;
use mongodb::change_stream::ChangeStream;
use mongodb::change_stream::event::ChangeStreamEvent;
use mongodb::options::{ReadConcern, SelectionCriteria};
use mongodb::Cursor;
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::options::convert;
use crate::provider::{ReadProvider, check_command_reply};

use super::CliServiceProvider;

#[async_trait]
impl ReadProvider for CliServiceProvider {
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Cursor<Document>> {
        let effective = self.merger().merge(&options);
        let find_options = convert::to_find_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        debug!("find on '{}.{}'", database, collection);
        let cursor = coll.find(filter).with_options(find_options).await?;
        Ok(cursor)
    }

    async fn count(
        &self,
        database: &str,
        collection: &str,
        query: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<u64> {
        self.count_documents(database, collection, query, options, db_options)
            .await
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<u64> {
        let effective = self.merger().merge(&options);
        let count_options = convert::to_count_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let count = coll
            .count_documents(filter)
            .with_options(count_options)
            .await?;
        Ok(count)
    }

    async fn estimated_document_count(
        &self,
        database: &str,
        collection: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<u64> {
        let effective = self.merger().merge(&options);
        let count_options = convert::to_estimated_count_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let count = coll
            .estimated_document_count()
            .with_options(count_options)
            .await?;
        Ok(count)
    }

    async fn distinct(
        &self,
        database: &str,
        collection: &str,
        field_name: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Vec<Bson>> {
        let effective = self.merger().merge(&options);
        let distinct_options = convert::to_distinct_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let values = coll
            .distinct(field_name, filter)
            .with_options(distinct_options)
            .await?;
        Ok(values)
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Cursor<Document>> {
        let effective = self.merger().merge(&options);
        let aggregate_options = convert::to_aggregate_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        debug!(
            "aggregate on '{}.{}' ({} stages)",
            database,
            collection,
            pipeline.len()
        );
        let cursor = coll
            .aggregate(pipeline)
            .with_options(aggregate_options)
            .await?;
        Ok(cursor)
    }

    async fn aggregate_db(
        &self,
        database: &str,
        pipeline: Vec<Document>,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Cursor<Document>> {
        let effective = self.merger().merge(&options);
        let aggregate_options = convert::to_aggregate_options(&effective)?;
        let db = self.db(database, db_options).await?;

        let cursor = db
            .aggregate(pipeline)
            .with_options(aggregate_options)
            .await?;
        Ok(cursor)
    }

    async fn get_indexes(
        &self,
        database: &str,
        collection: &str,
        db_options: Option<Document>,
    ) -> Result<Vec<Document>> {
        let coll = self.collection(database, collection, db_options).await?;

        let models: Vec<IndexModel> = coll.list_indexes().await?.try_collect().await?;
        let mut indexes = Vec::with_capacity(models.len());
        for model in &models {
            indexes.push(
                bson::to_document(model)
                    .map_err(|e| ProviderError::Internal(format!("index description: {e}")))?,
            );
        }
        Ok(indexes)
    }

    async fn list_collections(
        &self,
        database: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Vec<Document>> {
        let effective = self.merger().merge(&options);
        let spec = list_collections_spec(filter, &effective);

        let reply = self
            .run_command_with_check(database, spec, effective, db_options)
            .await?;

        let batch = reply
            .get_document("cursor")
            .and_then(|cursor| cursor.get_array("firstBatch"))
            .map_err(|e| ProviderError::Internal(format!("malformed listCollections reply: {e}")))?;

        Ok(batch
            .iter()
            .filter_map(|value| value.as_document().cloned())
            .collect())
    }

    async fn list_databases(&self, options: Document) -> Result<Document> {
        let effective = self.merger().merge(&options);
        let spec = list_databases_spec(&effective);

        self.run_command_with_check("admin", spec, effective, None)
            .await
    }

    async fn is_capped(
        &self,
        database: &str,
        collection: &str,
        db_options: Option<Document>,
    ) -> Result<bool> {
        let infos = self
            .list_collections(
                database,
                doc! { "name": collection },
                Document::new(),
                db_options,
            )
            .await?;

        let capped = infos
            .first()
            .and_then(|info| info.get_document("options").ok())
            .and_then(|options| options.get_bool("capped").ok())
            .unwrap_or(false);
        Ok(capped)
    }

    async fn stats(
        &self,
        database: &str,
        collection: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Document> {
        let effective = self.merger().merge(&options);
        let spec = coll_stats_spec(collection, &effective);

        self.run_command_with_check(database, spec, effective, db_options)
            .await
    }

    async fn run_command(
        &self,
        database: &str,
        spec: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Document> {
        let effective = self.merger().merge(&options);
        let run_options = convert::to_run_command_options(&effective)?;
        let db = self.db(database, db_options).await?;

        debug!("run_command on '{}'", database);
        let reply = db.run_command(spec).with_options(run_options).await?;
        Ok(reply)
    }

    async fn run_command_with_check(
        &self,
        database: &str,
        spec: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Document> {
        let reply = self
            .run_command(database, spec.clone(), options, db_options)
            .await?;
        check_command_reply(&spec, reply)
    }

    async fn watch(
        &self,
        pipeline: Vec<Document>,
        options: Document,
        db_options: Document,
        database: Option<&str>,
        collection: Option<&str>,
    ) -> Result<ChangeStream<ChangeStreamEvent<Document>>> {
        // Scope routing; an impossible scope is rejected before any
        // driver work happens.
        if database.is_none() {
            if let Some(coll) = collection {
                return Err(ProviderError::InvalidArgument(format!(
                    "cannot watch collection '{coll}' without a database"
                )));
            }
        }

        let effective = self.merger().merge(&options);
        let stream_options = convert::to_change_stream_options(&effective)?;

        let stream = match (database, collection) {
            (Some(db_name), Some(coll_name)) => {
                debug!("watch on '{}.{}'", db_name, coll_name);
                let coll = self.collection(db_name, coll_name, Some(db_options)).await?;
                coll.watch()
                    .pipeline(pipeline)
                    .with_options(stream_options)
                    .await?
            }
            (Some(db_name), None) => {
                debug!("watch on database '{}'", db_name);
                let db = self.db(db_name, Some(db_options)).await?;
                db.watch()
                    .pipeline(pipeline)
                    .with_options(stream_options)
                    .await?
            }
            _ => {
                debug!("watch on deployment");
                let client = self.connection().client().await;
                client
                    .watch()
                    .pipeline(pipeline)
                    .with_options(stream_options)
                    .await?
            }
        };
        Ok(stream)
    }

    async fn read_preference(&self) -> Option<SelectionCriteria> {
        self.connection().client().await.selection_criteria().cloned()
    }

    async fn read_concern(&self) -> Option<ReadConcern> {
        self.connection().client().await.read_concern().cloned()
    }
}

/// Build the `listCollections` command from the effective options.
fn list_collections_spec(filter: Document, effective: &Document) -> Document {
    let mut spec = doc! { "listCollections": 1, "filter": filter };
    if let Ok(name_only) = effective.get_bool("nameOnly") {
        spec.insert("nameOnly", name_only);
    }
    spec
}

/// Build the `listDatabases` command from the effective options.
fn list_databases_spec(effective: &Document) -> Document {
    let mut spec = doc! { "listDatabases": 1 };
    for key in ["nameOnly", "authorizedDatabases", "filter"] {
        if let Some(value) = effective.get(key) {
            spec.insert(key, value.clone());
        }
    }
    spec
}

/// Build the `collStats` command from the effective options.
fn coll_stats_spec(collection: &str, effective: &Document) -> Document {
    let mut spec = doc! { "collStats": collection };
    if let Some(scale) = effective.get("scale") {
        spec.insert("scale", scale.clone());
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionMerger;

    #[test]
    fn test_connection_defaults_shape_command_specs() {
        let merger = OptionMerger::new();
        merger.set_connection_defaults(doc! { "nameOnly": true, "scale": 1024 });
        let effective = merger.merge(&doc! {});

        let spec = list_collections_spec(doc! { "name": "users" }, &effective);
        assert!(spec.get_bool("nameOnly").unwrap());

        let spec = list_databases_spec(&effective);
        assert!(spec.get_bool("nameOnly").unwrap());

        let spec = coll_stats_spec("users", &effective);
        assert_eq!(spec.get_i32("scale").unwrap(), 1024);
    }

    #[test]
    fn test_call_options_override_defaults_in_command_specs() {
        let merger = OptionMerger::new();
        merger.set_connection_defaults(doc! { "scale": 1024 });
        let effective = merger.merge(&doc! { "scale": 1 });

        let spec = coll_stats_spec("users", &effective);
        assert_eq!(spec.get_i32("scale").unwrap(), 1);
    }

    #[test]
    fn test_command_specs_without_optional_keys() {
        let effective = OptionMerger::new().merge(&doc! {});

        assert_eq!(
            list_collections_spec(doc! {}, &effective),
            doc! { "listCollections": 1, "filter": {} }
        );
        assert_eq!(list_databases_spec(&effective), doc! { "listDatabases": 1 });
        assert_eq!(
            coll_stats_spec("users", &effective),
            doc! { "collStats": "users" }
        );
    }
}

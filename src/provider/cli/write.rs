//! Document mutation operations.

use async_trait::async_trait;
use bson::Document;
use mongodb::Namespace;
use mongodb::options::{UpdateModifications, WriteConcern};
use mongodb::results::{
    DeleteResult, InsertManyResult, InsertOneResult, SummaryBulkWriteResult, UpdateResult,
};
use tracing::debug;

use crate::error::Result;
use crate::options::convert;
use crate::provider::{BulkOp, BulkOpBuilder, WriteProvider};

use super::CliServiceProvider;

#[async_trait]
impl WriteProvider for CliServiceProvider {
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<InsertOneResult> {
        let effective = self.merger().merge(&options);
        let insert_options = convert::to_insert_one_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let result = coll
            .insert_one(document)
            .with_options(insert_options)
            .await?;
        Ok(result)
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<InsertManyResult> {
        let effective = self.merger().merge(&options);
        let insert_options = convert::to_insert_many_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        debug!(
            "insert_many on '{}.{}' ({} documents)",
            database,
            collection,
            documents.len()
        );
        let result = coll
            .insert_many(documents)
            .with_options(insert_options)
            .await?;
        Ok(result)
    }

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<UpdateResult> {
        let effective = self.merger().merge(&options);
        let update_options = convert::to_update_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let result = coll
            .update_one(filter, update)
            .with_options(update_options)
            .await?;
        Ok(result)
    }

    async fn update_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<UpdateResult> {
        let effective = self.merger().merge(&options);
        let update_options = convert::to_update_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let result = coll
            .update_many(filter, update)
            .with_options(update_options)
            .await?;
        Ok(result)
    }

    async fn replace_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<UpdateResult> {
        let effective = self.merger().merge(&options);
        let replace_options = convert::to_replace_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let result = coll
            .replace_one(filter, replacement)
            .with_options(replace_options)
            .await?;
        Ok(result)
    }

    async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<DeleteResult> {
        let effective = self.merger().merge(&options);
        let delete_options = convert::to_delete_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let result = coll
            .delete_one(filter)
            .with_options(delete_options)
            .await?;
        Ok(result)
    }

    async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<DeleteResult> {
        let effective = self.merger().merge(&options);
        let delete_options = convert::to_delete_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let result = coll
            .delete_many(filter)
            .with_options(delete_options)
            .await?;
        Ok(result)
    }

    async fn remove(
        &self,
        database: &str,
        collection: &str,
        query: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<DeleteResult> {
        self.delete_many(database, collection, query, options, db_options)
            .await
    }

    async fn find_one_and_delete(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Option<Document>> {
        let effective = self.merger().merge(&options);
        let fod_options = convert::to_find_one_and_delete_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let previous = coll
            .find_one_and_delete(filter)
            .with_options(fod_options)
            .await?;
        Ok(previous)
    }

    async fn find_one_and_replace(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Option<Document>> {
        let effective = self.merger().merge(&options);
        let for_options = convert::to_find_one_and_replace_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let previous = coll
            .find_one_and_replace(filter, replacement)
            .with_options(for_options)
            .await?;
        Ok(previous)
    }

    async fn find_one_and_update(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Option<Document>> {
        let effective = self.merger().merge(&options);
        let fou_options = convert::to_find_one_and_update_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        let previous = coll
            .find_one_and_update(filter, update)
            .with_options(fou_options)
            .await?;
        Ok(previous)
    }

    async fn bulk_write(
        &self,
        database: &str,
        collection: &str,
        requests: Vec<BulkOp>,
        ordered: bool,
        options: Document,
    ) -> Result<SummaryBulkWriteResult> {
        let mut builder = self
            .initialize_bulk_op(database, collection, ordered, options)
            .await?;
        for request in requests {
            builder.append(request);
        }
        builder.execute().await
    }

    async fn initialize_bulk_op(
        &self,
        database: &str,
        collection: &str,
        ordered: bool,
        options: Document,
    ) -> Result<BulkOpBuilder> {
        let effective = self.merger().merge(&options);
        let namespace = Namespace::new(database, collection);

        Ok(BulkOpBuilder::new(
            self.connection().client().await,
            namespace,
            ordered,
            effective,
        ))
    }

    async fn write_concern(&self) -> Option<WriteConcern> {
        self.connection().client().await.write_concern().cloned()
    }
}

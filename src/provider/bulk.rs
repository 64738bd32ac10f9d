//! Bulk write requests and the caller-managed bulk builder.
//!
//! Two entry points share these types: the one-shot
//! [`bulk_write`](crate::provider::WriteProvider::bulk_write) operation,
//! which takes a finished `Vec<BulkOp>`, and
//! [`initialize_bulk_op`](crate::provider::WriteProvider::initialize_bulk_op),
//! which hands the caller a [`BulkOpBuilder`] to fill incrementally and
//! execute later. Both funnel into the driver's client-level bulk write.

use bson::Document;
use mongodb::options::{
    DeleteManyModel, DeleteOneModel, InsertOneModel, ReplaceOneModel, UpdateManyModel,
    UpdateModifications, UpdateOneModel, WriteModel,
};
use mongodb::results::SummaryBulkWriteResult;
use mongodb::{Client, Namespace};
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::options::convert;

/// A single write request queued for batch execution.
#[derive(Debug, Clone)]
pub enum BulkOp {
    InsertOne {
        document: Document,
    },
    UpdateOne {
        filter: Document,
        update: UpdateModifications,
        upsert: bool,
    },
    UpdateMany {
        filter: Document,
        update: UpdateModifications,
        upsert: bool,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        upsert: bool,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
}

impl BulkOp {
    /// Bind this request to a namespace, producing the driver's model.
    fn into_write_model(self, namespace: &Namespace) -> WriteModel {
        match self {
            BulkOp::InsertOne { document } => InsertOneModel::builder()
                .namespace(namespace.clone())
                .document(document)
                .build()
                .into(),
            BulkOp::UpdateOne {
                filter,
                update,
                upsert,
            } => UpdateOneModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .update(update)
                .upsert(upsert)
                .build()
                .into(),
            BulkOp::UpdateMany {
                filter,
                update,
                upsert,
            } => UpdateManyModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .update(update)
                .upsert(upsert)
                .build()
                .into(),
            BulkOp::ReplaceOne {
                filter,
                replacement,
                upsert,
            } => ReplaceOneModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .replacement(replacement)
                .upsert(upsert)
                .build()
                .into(),
            BulkOp::DeleteOne { filter } => DeleteOneModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .build()
                .into(),
            BulkOp::DeleteMany { filter } => DeleteManyModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .build()
                .into(),
        }
    }
}

/// Accumulates write requests against one collection for later execution.
///
/// The ordering mode and the effective command options are fixed when the
/// builder is created; only the request list grows afterwards.
pub struct BulkOpBuilder {
    client: Client,
    namespace: Namespace,
    ordered: bool,
    options: Document,
    ops: Vec<BulkOp>,
}

impl BulkOpBuilder {
    pub(crate) fn new(client: Client, namespace: Namespace, ordered: bool, options: Document) -> Self {
        Self {
            client,
            namespace,
            ordered,
            options,
            ops: Vec::new(),
        }
    }

    /// Whether requests execute in order, stopping at the first error.
    pub fn ordered(&self) -> bool {
        self.ordered
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queue a request.
    pub fn append(&mut self, op: BulkOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn insert_one(&mut self, document: Document) -> &mut Self {
        self.append(BulkOp::InsertOne { document })
    }

    pub fn update_one(
        &mut self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        upsert: bool,
    ) -> &mut Self {
        self.append(BulkOp::UpdateOne {
            filter,
            update: update.into(),
            upsert,
        })
    }

    pub fn update_many(
        &mut self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        upsert: bool,
    ) -> &mut Self {
        self.append(BulkOp::UpdateMany {
            filter,
            update: update.into(),
            upsert,
        })
    }

    pub fn replace_one(&mut self, filter: Document, replacement: Document, upsert: bool) -> &mut Self {
        self.append(BulkOp::ReplaceOne {
            filter,
            replacement,
            upsert,
        })
    }

    pub fn delete_one(&mut self, filter: Document) -> &mut Self {
        self.append(BulkOp::DeleteOne { filter })
    }

    pub fn delete_many(&mut self, filter: Document) -> &mut Self {
        self.append(BulkOp::DeleteMany { filter })
    }

    /// Execute all queued requests as one driver-level bulk write.
    ///
    /// Rejects an empty builder instead of sending a no-op command.
    pub async fn execute(self) -> Result<SummaryBulkWriteResult> {
        let Self {
            client,
            namespace,
            ordered,
            options,
            ops,
        } = self;

        if ops.is_empty() {
            return Err(ProviderError::InvalidArgument(
                "bulk operation contains no write requests".to_string(),
            ));
        }

        debug!(
            namespace = %namespace,
            requests = ops.len(),
            ordered,
            "executing bulk write"
        );

        let models: Vec<WriteModel> = ops
            .into_iter()
            .map(|op| op.into_write_model(&namespace))
            .collect();
        let bulk_options = convert::to_bulk_write_options(&options, ordered)?;

        let result = client.bulk_write(models).with_options(bulk_options).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn test_namespace() -> Namespace {
        Namespace::new("db1", "coll1")
    }

    #[test]
    fn test_ops_bind_to_the_builder_namespace() {
        let ns = test_namespace();

        let model = BulkOp::InsertOne {
            document: doc! { "a": 1 },
        }
        .into_write_model(&ns);
        match model {
            WriteModel::InsertOne(m) => assert_eq!(m.namespace, ns),
            other => panic!("expected InsertOne, got {other:?}"),
        }

        let model = BulkOp::DeleteMany {
            filter: doc! { "a": { "$gt": 0 } },
        }
        .into_write_model(&ns);
        match model {
            WriteModel::DeleteMany(m) => assert_eq!(m.namespace, ns),
            other => panic!("expected DeleteMany, got {other:?}"),
        }
    }

    #[test]
    fn test_update_op_carries_upsert() {
        let model = BulkOp::UpdateOne {
            filter: doc! { "a": 1 },
            update: doc! { "$set": { "b": 2 } }.into(),
            upsert: true,
        }
        .into_write_model(&test_namespace());

        match model {
            WriteModel::UpdateOne(m) => assert_eq!(m.upsert, Some(true)),
            other => panic!("expected UpdateOne, got {other:?}"),
        }
    }

    async fn offline_client() -> Client {
        let options = mongodb::options::ClientOptions::parse("mongodb://localhost:27017")
            .await
            .unwrap();
        Client::with_options(options).unwrap()
    }

    #[tokio::test]
    async fn test_builder_queues_in_insertion_order() {
        let mut builder =
            BulkOpBuilder::new(offline_client().await, test_namespace(), true, Document::new());

        builder
            .insert_one(doc! { "a": 1 })
            .update_many(doc! {}, doc! { "$inc": { "a": 1 } }, false)
            .delete_one(doc! { "a": 2 });

        assert!(builder.ordered());
        assert_eq!(builder.len(), 3);
        assert!(matches!(builder.ops[0], BulkOp::InsertOne { .. }));
        assert!(matches!(builder.ops[1], BulkOp::UpdateMany { .. }));
        assert!(matches!(builder.ops[2], BulkOp::DeleteOne { .. }));
    }

    #[tokio::test]
    async fn test_empty_builder_refuses_to_execute() {
        let builder =
            BulkOpBuilder::new(offline_client().await, test_namespace(), false, Document::new());

        let result = builder.execute().await;
        assert!(matches!(result, Err(ProviderError::InvalidArgument(_))));
    }
}

//! Administration and connection lifecycle operations.

use async_trait::async_trait;
use bson::{Document, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, IndexModel};
use tracing::{debug, info};

use crate::connection::AuthOptions;
use crate::error::{ProviderError, Result};
use crate::options::convert;
use crate::provider::{AdminProvider, CommandAck, DropDatabaseResult, ReadProvider, normalize_drop_database};

use super::CliServiceProvider;

/// Parse `{key, ...index options}` specs into driver index models.
///
/// Everything next to `key` is treated as an index option (`name`,
/// `unique`, `expireAfterSeconds`, ...), matching the shape of
/// `db.collection.createIndexes()` arguments.
fn index_models_from(index_specs: Vec<Document>) -> Result<Vec<IndexModel>> {
    let mut models = Vec::with_capacity(index_specs.len());

    for mut spec in index_specs {
        let keys = match spec.remove("key") {
            Some(bson::Bson::Document(keys)) => keys,
            _ => {
                return Err(ProviderError::InvalidArgument(
                    "index specification is missing a 'key' document".to_string(),
                ));
            }
        };

        let index_options: IndexOptions = bson::from_document(spec)
            .map_err(|e| ProviderError::InvalidArgument(format!("index options: {e}")))?;

        models.push(
            IndexModel::builder()
                .keys(keys)
                .options(index_options)
                .build(),
        );
    }
    Ok(models)
}

#[async_trait]
impl AdminProvider for CliServiceProvider {
    async fn create_collection(
        &self,
        database: &str,
        collection: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<CommandAck> {
        let effective = self.merger().merge(&options);
        let create_options = convert::to_create_collection_options(&effective)?;
        let db = self.db(database, db_options).await?;

        info!("Creating collection '{}.{}'", database, collection);
        db.create_collection(collection)
            .with_options(create_options)
            .await?;
        Ok(CommandAck::ok())
    }

    async fn create_indexes(
        &self,
        database: &str,
        collection: &str,
        index_specs: Vec<Document>,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<Vec<String>> {
        let effective = self.merger().merge(&options);
        let create_options = convert::to_create_index_options(&effective)?;
        let models = index_models_from(index_specs)?;
        let coll = self.collection(database, collection, db_options).await?;

        debug!(
            "Creating {} indexes on '{}.{}'",
            models.len(),
            database,
            collection
        );
        let result = coll
            .create_indexes(models)
            .with_options(create_options)
            .await?;
        Ok(result.index_names)
    }

    async fn drop_collection(
        &self,
        database: &str,
        collection: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<bool> {
        let effective = self.merger().merge(&options);
        let drop_options = convert::to_drop_collection_options(&effective)?;
        let coll = self.collection(database, collection, db_options).await?;

        info!("Dropping collection '{}.{}'", database, collection);
        coll.drop().with_options(drop_options).await?;
        Ok(true)
    }

    async fn drop_database(
        &self,
        database: &str,
        options: Document,
        db_options: Option<Document>,
    ) -> Result<DropDatabaseResult> {
        let effective = self.merger().merge(&options);
        let drop_options = convert::to_drop_database_options(&effective)?;
        let db = self.db(database, db_options).await?;

        info!("Dropping database '{}'", database);
        db.drop().with_options(drop_options).await?;
        Ok(normalize_drop_database(database, true))
    }

    async fn rename_collection(
        &self,
        database: &str,
        old_name: &str,
        new_name: &str,
        drop_target: bool,
    ) -> Result<Document> {
        let spec = doc! {
            "renameCollection": format!("{database}.{old_name}"),
            "to": format!("{database}.{new_name}"),
            "dropTarget": drop_target,
        };

        info!(
            "Renaming '{}.{}' to '{}.{}'",
            database, old_name, database, new_name
        );
        self.run_command_with_check("admin", spec, Document::new(), None)
            .await
    }

    async fn authenticate(&self, auth: &AuthOptions) -> Result<CommandAck> {
        self.connection().authenticate(auth).await?;
        Ok(CommandAck::ok())
    }

    async fn reset_connection_options(&self, partial: Document) -> Result<CommandAck> {
        self.connection().reset_options(&partial).await?;
        Ok(CommandAck::ok())
    }

    fn set_command_defaults(&self, defaults: Document) {
        self.merger().set_connection_defaults(defaults);
    }

    async fn close(&self, force: bool) -> Result<()> {
        self.connection().close(force).await
    }

    async fn get_raw_client(&self) -> Client {
        self.connection().client().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_specs_parse_keys_and_options() {
        let specs = vec![
            doc! { "key": { "email": 1 }, "name": "email_1", "unique": true },
            doc! { "key": { "created": -1 } },
        ];

        let models = index_models_from(specs).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].keys, doc! { "email": 1 });

        let options = models[0].options.as_ref().unwrap();
        assert_eq!(options.name.as_deref(), Some("email_1"));
        assert_eq!(options.unique, Some(true));
    }

    #[test]
    fn test_index_spec_without_key_rejected() {
        let result = index_models_from(vec![doc! { "name": "broken" }]);
        assert!(matches!(result, Err(ProviderError::InvalidArgument(_))));
    }
}

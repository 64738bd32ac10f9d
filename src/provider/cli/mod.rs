//! Driver-backed provider implementation.
//!
//! [`CliServiceProvider`] glues the option merger and the connection
//! manager to the official driver. The trait implementations live next
//! door, split the way the contract splits: [`read`] for
//! [`ReadProvider`](crate::provider::ReadProvider), [`write`] for
//! [`WriteProvider`](crate::provider::WriteProvider), [`admin`] for
//! [`AdminProvider`](crate::provider::AdminProvider).

mod admin;
mod read;
mod write;

use bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{ClientSession, Collection, Database};
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::options::OptionMerger;
use crate::provider::ReadProvider;

/// Provider implementation for interactive command-line sessions.
pub struct CliServiceProvider {
    connection: ConnectionManager,
    merger: OptionMerger,
}

impl CliServiceProvider {
    /// Connect and build a provider.
    ///
    /// `allow_offline` lets the session start without a reachable server
    /// (an empty or unusable URI), for shells launched with no deployment
    /// to talk to yet.
    pub async fn connect(
        uri: &str,
        driver_options: Option<ClientOptions>,
        allow_offline: bool,
    ) -> Result<Self> {
        let connection = ConnectionManager::connect(uri, driver_options, allow_offline).await?;
        Ok(Self {
            connection,
            merger: OptionMerger::new(),
        })
    }

    /// Connection URI the session was established with.
    pub fn uri(&self) -> &str {
        self.connection.uri()
    }

    /// Database named by the connection string, or the driver default.
    pub fn initial_db(&self) -> String {
        self.connection.initial_db()
    }

    /// Server and connection facts for the shell's greeting banner.
    pub async fn connection_info(&self) -> Result<Document> {
        let build_info = self
            .run_command("admin", doc! { "buildInfo": 1 }, Document::new(), None)
            .await?;

        let mut info = doc! {
            "buildInfo": build_info,
            "extraInfo": { "uri": self.connection.uri() },
        };

        // Unprivileged users may not run getCmdLineOpts; the banner does
        // without it.
        if let Ok(cmd_line_opts) = self
            .run_command("admin", doc! { "getCmdLineOpts": 1 }, Document::new(), None)
            .await
        {
            info.insert("cmdLineOpts", cmd_line_opts);
        }

        Ok(info)
    }

    /// Start a driver session on the active client, for callers that
    /// coordinate multi-operation work themselves.
    pub async fn start_session(&self) -> Result<ClientSession> {
        let session = self.connection.client().await.start_session().await?;
        Ok(session)
    }

    pub(crate) fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub(crate) fn merger(&self) -> &OptionMerger {
        &self.merger
    }

    /// Resolve a database handle through the connection's handle cache.
    pub(crate) async fn db(&self, name: &str, db_options: Option<Document>) -> Result<Database> {
        self.connection
            .database(name, &db_options.unwrap_or_default())
            .await
    }

    /// Resolve a collection on a cached database handle.
    pub(crate) async fn collection(
        &self,
        database: &str,
        collection: &str,
        db_options: Option<Document>,
    ) -> Result<Collection<Document>> {
        let db = self.db(database, db_options).await?;
        debug!("Resolved collection '{}.{}'", database, collection);
        Ok(db.collection::<Document>(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::AdminProvider;

    async fn offline_provider() -> CliServiceProvider {
        CliServiceProvider::connect("", None, true)
            .await
            .expect("offline session")
    }

    #[tokio::test]
    async fn test_offline_connect_reports_default_db() {
        let provider = offline_provider().await;
        assert_eq!(provider.initial_db(), "test");
    }

    #[tokio::test]
    async fn test_command_defaults_feed_the_merge() {
        let provider = offline_provider().await;
        provider.set_command_defaults(doc! { "maxTimeMS": 250 });

        let effective = provider.merger().merge(&doc! {});
        assert_eq!(effective.get_i32("maxTimeMS").unwrap(), 250);

        // Replaced wholesale, not merged into the previous defaults.
        provider.set_command_defaults(doc! { "comment": "audit" });
        let effective = provider.merger().merge(&doc! {});
        assert!(!effective.contains_key("maxTimeMS"));
        assert_eq!(effective.get_str("comment").unwrap(), "audit");
    }

    #[tokio::test]
    async fn test_watch_rejects_collection_without_database() {
        let provider = offline_provider().await;

        let result = provider
            .watch(vec![], Document::new(), Document::new(), None, Some("users"))
            .await;

        match result {
            Err(ProviderError::InvalidArgument(message)) => {
                assert!(message.contains("users"));
            }
            other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
        }
    }
}

//! Connection lifecycle management.
//!
//! This module owns the single active driver client per provider instance
//! and everything derived from it:
//! - connection establishment (including offline placeholder sessions)
//! - authentication and option resets, both implemented as
//!   build-new-client / verify / swap / close-old sequences
//! - the generation counter that serves as the connection identity
//! - the per-identity database handle cache
//!
//! The swap-then-close ordering is a hard invariant: the old client is
//! closed only after the replacement is installed, so in-flight callers
//! never observe a closed active client. A failed build or verification
//! leaves the previous client, its generation, and its cached handles
//! untouched.

pub(crate) mod cache;

use bson::{Document, doc};
use mongodb::options::{AuthMechanism, ClientOptions, Credential};
use mongodb::{Client, Database};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{ConnectionError, ProviderError, Result};
use crate::options::convert::{read_concern_from, read_preference_from, write_concern_from};
use crate::options::db_options_signature;

use cache::HandleCache;

/// Database used when the connection string names none.
pub const DEFAULT_DB: &str = "test";

/// Placeholder address for disconnected (`nodb`) command-line sessions.
const OFFLINE_PLACEHOLDER_URI: &str = "mongodb://nodb.placeholder:27017/";

/// Credentials supplied by the shell's `db.auth()` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOptions {
    /// Username.
    pub user: String,

    /// Password; absent for external mechanisms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pwd: Option<String>,

    /// Authentication mechanism name (e.g. `SCRAM-SHA-256`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<String>,

    /// Authentication database; defaults to the driver's resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_db: Option<String>,
}

/// The current connection identity: one live client, its generation
/// counter, and the handle cache derived from it. Replaced as a unit on
/// every swap, which is what invalidates stale handles wholesale.
struct ActiveConnection {
    client: Client,
    generation: u64,
    cache: HandleCache,
}

/// Owns the active driver client and serializes its replacement.
pub struct ConnectionManager {
    /// Connection URI the session was established with.
    uri: String,

    /// Original client options; authentication and option resets always
    /// start from these, never from previously mutated options, so
    /// repeated resets cannot compound partial overrides.
    initial_options: ClientOptions,

    /// Current connection identity.
    active: RwLock<ActiveConnection>,

    /// Serializes authenticate / reset_options / close; a second
    /// replacement request queues behind an in-flight one instead of
    /// racing it.
    swap_lock: Mutex<()>,
}

impl ConnectionManager {
    /// Establish a connection.
    ///
    /// Parses `uri` into client options unless `driver_options` supplies
    /// them already. Liveness is verified with a `ping` against `admin`
    /// unless `allow_offline` is set, in which case an unusable or empty
    /// URI falls back to a placeholder address so disconnected shell
    /// sessions can still start.
    pub async fn connect(
        uri: &str,
        driver_options: Option<ClientOptions>,
        allow_offline: bool,
    ) -> Result<Self> {
        let client_options = match driver_options {
            Some(options) => options,
            None => Self::parse_uri(uri, allow_offline).await?,
        };

        let client = Client::with_options(client_options.clone())
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        if !allow_offline {
            verify_live(&client).await?;
        }

        info!("Connected to '{}' (offline: {})", uri, allow_offline);

        Ok(Self {
            uri: uri.to_string(),
            initial_options: client_options,
            active: RwLock::new(ActiveConnection {
                client,
                generation: 0,
                cache: HandleCache::new(),
            }),
            swap_lock: Mutex::new(()),
        })
    }

    async fn parse_uri(uri: &str, allow_offline: bool) -> Result<ClientOptions> {
        if uri.is_empty() {
            if allow_offline {
                return ClientOptions::parse(OFFLINE_PLACEHOLDER_URI)
                    .await
                    .map_err(|e| ConnectionError::InvalidUri(e.to_string()).into());
            }
            return Err(ConnectionError::InvalidUri("empty connection URI".to_string()).into());
        }

        match ClientOptions::parse(uri).await {
            Ok(options) => Ok(options),
            Err(e) if allow_offline => {
                info!("URI '{}' unusable ({}); starting offline session", uri, e);
                ClientOptions::parse(OFFLINE_PLACEHOLDER_URI)
                    .await
                    .map_err(|e| ConnectionError::InvalidUri(e.to_string()).into())
            }
            Err(e) => Err(ConnectionError::InvalidUri(e.to_string()).into()),
        }
    }

    /// Connection URI the session was established with.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Database named by the connection string, or [`DEFAULT_DB`].
    pub fn initial_db(&self) -> String {
        self.initial_options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DB.to_string())
    }

    /// Clone of the current driver client.
    ///
    /// Explicit escape hatch for collaborators needing driver-native
    /// access, not a general-purpose bypass of the provider surface.
    pub async fn client(&self) -> Client {
        self.active.read().await.client.clone()
    }

    /// Current connection generation; bumped on every successful swap.
    pub async fn generation(&self) -> u64 {
        self.active.read().await.generation
    }

    /// Number of handles cached for the current identity.
    pub(crate) async fn cached_handles(&self) -> usize {
        self.active.read().await.cache.len()
    }

    /// Resolve a database handle bound to the current connection identity.
    ///
    /// Returns the cached handle when one exists for the exact
    /// `(name, option signature)` key, otherwise constructs and caches one.
    /// The write lock is held across the miss, construction, and insert, so
    /// a concurrent swap cannot hand out a handle from a discarded client.
    pub async fn database(&self, name: &str, db_options: &Document) -> Result<Database> {
        let signature = db_options_signature(db_options);

        {
            let active = self.active.read().await;
            if let Some(database) = active.cache.get(name, &signature) {
                return Ok(database);
            }
        }

        let database_options = crate::options::convert::to_database_options(db_options)?;

        let mut active = self.active.write().await;
        if let Some(database) = active.cache.get(name, &signature) {
            return Ok(database);
        }

        debug!("Caching database handle for '{}' [{}]", name, signature);
        let database = active.client.database_with_options(name, database_options);
        active.cache.insert(name, &signature, database.clone());
        Ok(database)
    }

    /// Re-authenticate by replacing the active client.
    ///
    /// A brand-new client is built from the original connection options
    /// with only the credential fields substituted. The swap happens only
    /// after the new client is confirmed live; on failure the previous
    /// client stays active and this returns `ConnectionError`.
    pub async fn authenticate(&self, auth: &AuthOptions) -> Result<()> {
        let _guard = self.swap_lock.lock().await;

        let mut client_options = self.initial_options.clone();

        let mut credential = Credential::default();
        credential.username = Some(auth.user.clone());
        credential.password = auth.pwd.clone();
        if let Some(mechanism) = &auth.mechanism {
            credential.mechanism = Some(auth_mechanism_from(mechanism)?);
        }
        if let Some(auth_db) = &auth.auth_db {
            credential.source = Some(auth_db.clone());
        }
        client_options.credential = Some(credential);

        info!("Re-authenticating as '{}'", auth.user);
        self.replace_client(client_options)
            .await
            .map_err(|e| match e {
                ProviderError::Connection(ConnectionError::ConnectionFailed(msg)) => {
                    ConnectionError::AuthenticationFailed(msg).into()
                }
                other => other,
            })
    }

    /// Replace the active client with one using different connection-level
    /// options.
    ///
    /// `partial` is merged over the **original** connection options, never
    /// over previously reset ones. Recognized keys: `readPreference`,
    /// `readConcern`, `writeConcern`, `appName`.
    pub async fn reset_options(&self, partial: &Document) -> Result<()> {
        let _guard = self.swap_lock.lock().await;

        let mut client_options = self.initial_options.clone();

        if let Some(value) = partial.get("readPreference") {
            client_options.selection_criteria = Some(read_preference_from(value)?);
        }
        if let Some(value) = partial.get("readConcern") {
            client_options.read_concern = Some(read_concern_from(value)?);
        }
        if let Ok(concern) = partial.get_document("writeConcern") {
            client_options.write_concern = Some(write_concern_from(concern)?);
        }
        if let Ok(app_name) = partial.get_str("appName") {
            client_options.app_name = Some(app_name.to_string());
        }

        info!("Resetting connection options");
        self.replace_client(client_options).await
    }

    /// Build, verify, install, then close the displaced client.
    async fn replace_client(&self, client_options: ClientOptions) -> Result<()> {
        let new_client = Client::with_options(client_options)
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;
        verify_live(&new_client).await?;

        let old_client = self.install_client(new_client).await;

        // Close failures cannot surface here: the driver's shutdown is
        // infallible and drains in-flight operations on its own.
        old_client.shutdown().await;
        Ok(())
    }

    /// Swap the active identity; returns the displaced client.
    ///
    /// Bumps the generation and installs a fresh handle cache, making
    /// every handle derived from the old client unreachable.
    async fn install_client(&self, new_client: Client) -> Client {
        let mut active = self.active.write().await;
        let generation = active.generation + 1;
        let previous = std::mem::replace(
            &mut *active,
            ActiveConnection {
                client: new_client,
                generation,
                cache: HandleCache::new(),
            },
        );
        debug!("Installed connection generation {}", generation);
        previous.client
    }

    /// Close the active client and clear its handle cache.
    ///
    /// `force` skips graceful draining of in-flight operations.
    pub async fn close(&self, force: bool) -> Result<()> {
        let _guard = self.swap_lock.lock().await;

        let client = {
            let mut active = self.active.write().await;
            active.cache.clear();
            active.client.clone()
        };

        info!("Closing connection (force: {})", force);
        if force {
            client.shutdown().immediate(true).await;
        } else {
            client.shutdown().await;
        }
        Ok(())
    }
}

/// Verify a client can reach the deployment with a `ping` against `admin`.
async fn verify_live(client: &Client) -> Result<()> {
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;
    Ok(())
}

/// Map a mechanism name from the shell surface to the driver's enum.
fn auth_mechanism_from(name: &str) -> Result<AuthMechanism> {
    Ok(match name {
        "SCRAM-SHA-1" => AuthMechanism::ScramSha1,
        "SCRAM-SHA-256" => AuthMechanism::ScramSha256,
        "MONGODB-X509" => AuthMechanism::MongoDbX509,
        "PLAIN" => AuthMechanism::Plain,
        other => {
            return Err(ProviderError::InvalidArgument(format!(
                "unsupported authentication mechanism: {other}"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn offline_manager() -> ConnectionManager {
        ConnectionManager::connect("", None, true)
            .await
            .expect("offline session")
    }

    /// Options for a manager whose reconnect attempts fail fast.
    async fn unreachable_options() -> ClientOptions {
        let mut options = ClientOptions::parse(OFFLINE_PLACEHOLDER_URI)
            .await
            .expect("placeholder parse");
        options.server_selection_timeout = Some(Duration::from_millis(200));
        options
    }

    #[tokio::test]
    async fn test_offline_connect_uses_placeholder() {
        let manager = offline_manager().await;
        assert_eq!(manager.initial_db(), DEFAULT_DB);
        assert_eq!(manager.generation().await, 0);
    }

    #[tokio::test]
    async fn test_empty_uri_rejected_when_online() {
        let result = ConnectionManager::connect("", None, false).await;
        assert!(matches!(
            result,
            Err(ProviderError::Connection(ConnectionError::InvalidUri(_)))
        ));
    }

    #[tokio::test]
    async fn test_handle_cache_hits_on_equivalent_options() {
        let manager = offline_manager().await;

        manager
            .database(
                "shop",
                &doc! { "readConcern": { "level": "local" }, "readPreference": "primary" },
            )
            .await
            .unwrap();
        // Same options, different key order: one entry.
        manager
            .database(
                "shop",
                &doc! { "readPreference": "primary", "readConcern": { "level": "local" } },
            )
            .await
            .unwrap();
        assert_eq!(manager.cached_handles().await, 1);

        // Different option set: second entry.
        manager
            .database("shop", &doc! { "readConcern": { "level": "majority" } })
            .await
            .unwrap();
        assert_eq!(manager.cached_handles().await, 2);

        // Different database: third entry.
        manager.database("inventory", &doc! {}).await.unwrap();
        assert_eq!(manager.cached_handles().await, 3);
    }

    #[tokio::test]
    async fn test_swap_bumps_generation_and_discards_handles() {
        let manager = offline_manager().await;
        manager.database("shop", &doc! {}).await.unwrap();
        assert_eq!(manager.cached_handles().await, 1);

        let replacement = Client::with_options(unreachable_options().await).unwrap();
        let old = manager.install_client(replacement).await;
        old.shutdown().await;

        assert_eq!(manager.generation().await, 1);
        assert_eq!(manager.cached_handles().await, 0);

        // Resolving again builds a handle against the new identity.
        manager.database("shop", &doc! {}).await.unwrap();
        assert_eq!(manager.cached_handles().await, 1);
    }

    #[tokio::test]
    async fn test_failed_authenticate_preserves_active_connection() {
        let options = unreachable_options().await;
        let manager = ConnectionManager::connect(OFFLINE_PLACEHOLDER_URI, Some(options), true)
            .await
            .unwrap();
        manager.database("shop", &doc! {}).await.unwrap();

        let auth = AuthOptions {
            user: "admin".to_string(),
            pwd: Some("secret".to_string()),
            mechanism: None,
            auth_db: None,
        };
        let result = manager.authenticate(&auth).await;

        assert!(matches!(
            result,
            Err(ProviderError::Connection(
                ConnectionError::AuthenticationFailed(_)
            ))
        ));
        // The previous identity and its handles survive the failure.
        assert_eq!(manager.generation().await, 0);
        assert_eq!(manager.cached_handles().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_auth_mechanism_rejected() {
        let manager = offline_manager().await;
        let auth = AuthOptions {
            user: "admin".to_string(),
            pwd: Some("secret".to_string()),
            mechanism: Some("KERBEROS-5".to_string()),
            auth_db: None,
        };

        let result = manager.authenticate(&auth).await;
        assert!(matches!(result, Err(ProviderError::InvalidArgument(_))));
        assert_eq!(manager.generation().await, 0);
    }

    #[tokio::test]
    async fn test_close_clears_handle_cache() {
        let manager = offline_manager().await;
        manager.database("shop", &doc! {}).await.unwrap();
        assert_eq!(manager.cached_handles().await, 1);

        manager.close(true).await.unwrap();
        assert_eq!(manager.cached_handles().await, 0);
    }
}

//! MongoDB Service Provider Library
//!
//! This library is the driver abstraction layer beneath an interactive
//! MongoDB shell. It exposes the full command surface the shell needs
//! (queries, writes, administration, change streams) behind a stable
//! trait contract, while owning the driver-facing concerns the shell
//! should never see: option layering, database handle caching, and
//! connection replacement.
//!
//! # Modules
//!
//! - `connection`: Connection lifecycle, authentication, handle caching
//! - `error`: Error types and handling
//! - `options`: Option layering and BSON-to-driver option conversion
//! - `provider`: The provider contract and its driver-backed implementation
//!
//! # Example
//!
//! ```no_run
//! use bson::doc;
//! use mongosh_provider::{AdminProvider, CliServiceProvider, ReadProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider =
//!         CliServiceProvider::connect("mongodb://localhost:27017", None, false).await?;
//!
//!     let count = provider
//!         .count_documents("shop", "orders", doc! {}, doc! {}, None)
//!         .await?;
//!     println!("{count} orders");
//!
//!     provider.close(false).await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod options;
pub mod provider;

// Re-export commonly used types
pub use connection::{AuthOptions, ConnectionManager, DEFAULT_DB};
pub use error::{CommandFailedError, ConnectionError, ProviderError, Result};
pub use options::OptionMerger;
pub use provider::{
    AdminProvider, BulkOp, BulkOpBuilder, CliServiceProvider, CommandAck, DropDatabaseResult,
    ReadProvider, ServiceProvider, WriteProvider,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}

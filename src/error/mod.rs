//! Error handling for service provider operations.
//!
//! This module provides:
//! - The provider error taxonomy (connection, command, argument, internal)
//! - Structured error information extraction from MongoDB driver errors
//! - Consistent JSON error formatting for frontends and logging
//!
//! Driver-level errors are not swallowed or reinterpreted: everything the
//! provider does not explicitly normalize propagates unchanged as
//! [`ProviderError::MongoDb`].

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{CommandFailedError, ConnectionError, ProviderError, Result};
pub use mongo::{ErrorDetails, ErrorInfo};

//! Error types for the client hub.
//!
//! Configuration problems are reported before any state is touched. Failures
//! coming from the key-value store client are carried through as shared
//! error values so every waiter on a connection attempt sees the same cause.

use std::sync::Arc;
use thiserror::Error;

/// Error produced by a key-value store client (connect, destroy, events).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Client error that can be handed to several observers at once.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for hub operations.
#[derive(Debug, Clone, Error)]
pub enum HubError {
    /// A new client was requested without options and no defaults are set.
    #[error("No options provided for '{client_id}' and no default options exist.")]
    MissingOptions { client_id: String },

    /// The client library refused the options while constructing a client.
    #[error("Invalid options for '{client_id}': {message}")]
    InvalidOptions { client_id: String, message: String },

    /// The connect step of a client failed.
    #[error("Connection failed for '{client_id}': {source}")]
    Connection {
        client_id: String,
        #[source]
        source: SharedError,
    },

    /// One or more clients failed to shut down during teardown.
    #[error("Failed to destroy {} client(s): {}", .failures.len(), format_failures(.failures))]
    Teardown { failures: Vec<(String, SharedError)> },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

fn format_failures(failures: &[(String, SharedError)]) -> String {
    failures
        .iter()
        .map(|(client_id, err)| format!("[{}] {}", client_id, err))
        .collect::<Vec<_>>()
        .join("; ")
}

impl HubError {
    /// The client id this error concerns, if it is tied to a single client.
    pub fn client_id(&self) -> Option<&str> {
        match self {
            HubError::MissingOptions { client_id }
            | HubError::InvalidOptions { client_id, .. }
            | HubError::Connection { client_id, .. } => Some(client_id),
            HubError::Teardown { .. } | HubError::Config { .. } => None,
        }
    }

    /// Whether this error came from the client library rather than from
    /// how the hub was configured.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, HubError::Connection { .. } | HubError::Teardown { .. })
    }
}

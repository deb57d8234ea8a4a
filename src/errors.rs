use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Errors surfaced by the bootstrap sequence and the administrative operations.
///
/// Liveness-probe and per-index failures have no variant here: they are logged
/// and recorded, never propagated.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Client construction failed. Startup must abort.
    #[error("Failed to create MongoDB client for {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: MongoError,
    },

    #[error("Invalid database name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Failed to list databases: {0}")]
    ListDatabases(#[source] MongoError),

    #[error("Database '{0}' does not exist")]
    MissingDatabase(String),

    #[error("Refusing to drop '{0}': it is the main database")]
    ProtectedDatabase(String),

    #[error("No MongoDB client: the service was started offline")]
    NotConnected,

    #[error("Failed to drop database '{name}': {source}")]
    Drop {
        name: String,
        #[source]
        source: MongoError,
    },
}

impl BootstrapError {
    pub fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        BootstrapError::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the process should stop rather than carry on degraded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BootstrapError::Config(_)
                | BootstrapError::Connect { .. }
                | BootstrapError::MissingDatabase(_)
        )
    }
}

impl From<anyhow::Error> for BootstrapError {
    fn from(error: anyhow::Error) -> Self {
        BootstrapError::Config(error.to_string())
    }
}

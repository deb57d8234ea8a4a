use log::{info, warn};
use mongodb::Database as MongoDatabase;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::indexes::{ensure_indices, IndexReport, IndexTarget, CATALOG};
use super::mongodb::MongoDbClient;
use crate::config::{Config, MongoDbConfig};
use crate::errors::BootstrapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseRole {
    Main,
    Test,
}

impl fmt::Display for DatabaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseRole::Main => write!(f, "main"),
            DatabaseRole::Test => write!(f, "test"),
        }
    }
}

/// The logical database chosen at startup.
#[derive(Debug, Clone)]
pub struct ActiveDatabase {
    pub name: String,
    pub role: DatabaseRole,
    pub database: MongoDatabase,
}

/// Database context for the application.
///
/// Built once at startup and handed to every collaborator that needs the
/// database:
/// - owns the single [`MongoDbClient`]
/// - holds the [`ActiveDatabase`], selected once from the test-mode flag
/// - exposes the administrative operations (`ensure_indices`, `drop_test_database`)
///
/// An offline service has neither; index assurance then becomes a logged no-op.
#[derive(Debug, Clone)]
pub struct MongoDbService {
    client: Option<Arc<MongoDbClient>>,
    active: Option<ActiveDatabase>,
    config: MongoDbConfig,
}

impl MongoDbService {
    /// Connect and select the active database.
    pub async fn new(config: &MongoDbConfig) -> Result<Self, BootstrapError> {
        config.validate()?;

        let client = MongoDbClient::init(config).await?;

        let name = config.active_database();
        let role = if config.test_mode {
            DatabaseRole::Test
        } else {
            DatabaseRole::Main
        };

        if config.check_db_exists && !client.database_exists(&name).await? {
            return Err(BootstrapError::MissingDatabase(name));
        }

        let database = client.select(&name)?;
        info!("Using {} database {}", role, name);

        Ok(Self {
            client: Some(Arc::new(client)),
            active: Some(ActiveDatabase {
                name,
                role,
                database,
            }),
            config: config.clone(),
        })
    }

    /// A service with no client, for processes that must not touch the database.
    pub fn offline(config: &MongoDbConfig) -> Self {
        info!("Starting without a MongoDB connection");
        Self {
            client: None,
            active: None,
            config: config.clone(),
        }
    }

    /// Connect, or stay offline when the application is configured that way.
    pub async fn from_config(config: &Config) -> Result<Self, BootstrapError> {
        if config.server.offline {
            Ok(Self::offline(&config.database))
        } else {
            Self::new(&config.database).await
        }
    }

    /// Get MongoDB client
    pub fn get_client(&self) -> Option<&MongoDbClient> {
        self.client.as_deref()
    }

    pub fn active(&self) -> Option<&ActiveDatabase> {
        self.active.as_ref()
    }

    /// Database handle used by data-access code.
    pub fn database(&self) -> Option<MongoDatabase> {
        self.active.as_ref().map(|a| a.database.clone())
    }

    /// Handle to the configured test database, whichever database is active.
    pub fn test_database(&self) -> Result<MongoDatabase, BootstrapError> {
        self.client()?.select(&self.config.test_database)
    }

    pub fn config(&self) -> &MongoDbConfig {
        &self.config
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool, BootstrapError> {
        self.client()?.database_exists(name).await
    }

    /// Ensure the catalog indexes on the active database.
    pub async fn ensure_indices(&self) -> IndexReport {
        let target = match (&self.client, &self.active) {
            (Some(_), Some(active)) => Some(&active.database as &dyn IndexTarget),
            _ => None,
        };
        self.ensure_on(target).await
    }

    /// Ensure the catalog indexes on some other database, e.g. a fresh copy
    /// or [`Self::test_database`]. Skipped when the service is offline.
    pub async fn ensure_indices_on(&self, database: &dyn IndexTarget) -> IndexReport {
        let target = self.client.as_ref().map(|_| database);
        self.ensure_on(target).await
    }

    async fn ensure_on(&self, target: Option<&dyn IndexTarget>) -> IndexReport {
        let mut report = ensure_indices(target, CATALOG).await;
        report.role = report.database.as_deref().and_then(|name| self.role_of(name));
        report
    }

    fn role_of(&self, name: &str) -> Option<DatabaseRole> {
        if name == self.config.test_database {
            Some(DatabaseRole::Test)
        } else if name == self.config.main_database() {
            Some(DatabaseRole::Main)
        } else {
            None
        }
    }

    /// Drop the configured test database. The main database is never a target.
    pub async fn drop_test_database(&self) -> Result<(), BootstrapError> {
        let client = self.client()?;
        let name = test_database_target(&self.config)?;

        warn!("Dropping test database {}", name);
        client.drop_database(name).await
    }

    fn client(&self) -> Result<&MongoDbClient, BootstrapError> {
        self.client.as_deref().ok_or(BootstrapError::NotConnected)
    }
}

/// Name `drop_test_database` may remove, if the configuration allows one.
fn test_database_target(config: &MongoDbConfig) -> Result<&str, BootstrapError> {
    let main = config.main_database();
    if config.test_database == main {
        return Err(BootstrapError::ProtectedDatabase(main));
    }
    Ok(&config.test_database)
}

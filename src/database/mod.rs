// MongoDB modules
pub mod indexes;
pub mod mongodb;
pub mod service;

// Re-export commonly used types
pub use indexes::{ensure_indices, IndexReport, IndexSpec, IndexTarget, CATALOG};
pub use self::mongodb::{validate_database_name, MongoDbClient};
pub use service::{ActiveDatabase, DatabaseRole, MongoDbService};

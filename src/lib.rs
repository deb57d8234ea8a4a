pub mod config;
pub mod database;
pub mod errors;

pub use config::Config;
pub use database::MongoDbService;
pub use errors::BootstrapError;

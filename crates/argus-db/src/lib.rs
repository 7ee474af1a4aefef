pub mod config;
pub mod database;
pub mod queue;
pub mod repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use queue::PgQueueBus;
pub use repository::FetchRepository;

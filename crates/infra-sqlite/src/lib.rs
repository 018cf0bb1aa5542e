// Conduit Infrastructure - SQLite Adapter
// Implements: DurableQueue, QueueFactory

mod connection;
mod error;
mod migration;
mod queue_store;

pub use connection::{create_file_pool, create_pool};
pub use migration::run_migrations;
pub use queue_store::{SqliteQueue, SqliteQueueFactory};

// Note: sqlx::Error conversion is handled by map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)

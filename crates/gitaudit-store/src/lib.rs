//! Persistent store for deployments, pipeline runs, metrics, compliance,
//! orchestration, and auth state. Swap `InMemoryStore`
//! for `PgStore` at the composition root; both implement `Store`.

pub mod connection;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod store;
pub mod types;

pub use connection::DbConnection;
pub use memory::InMemoryStore;
pub use migrations::{Migration, MigrationRunner, MIGRATIONS};
pub use postgres::PgStore;
pub use store::{DeploymentStateUpdate, Store};
pub use types::*;

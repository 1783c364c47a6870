//! Library surface so integration tests (and `main.rs`) can build an
//! `AppState` and a `Router` without duplicating the composition logic.

pub mod auth_middleware;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod telemetry;

pub use config::Config;
pub use router::build as router;
pub use state::AppState;

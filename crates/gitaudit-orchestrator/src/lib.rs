//! Orchestration Planner: expands an
//! `OrchestrationProfile` into a DAG of actions and drives each through
//! the Deployment Engine, honoring stage execution modes, the critical
//! failure threshold, rollback-on-failure, and profile timeouts.

pub mod engine;
pub mod graph;
pub mod types;

pub use engine::{room_for, OrchestrationEngine};
pub use types::{select_repositories, ActionSpec};

//! Core business logic module
//!
//! The build orchestration engine. Tool and filesystem integrations it
//! depends on live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`target`] - Build targets and the target registry
//! - [`settings`] - Config file parsing and validation
//! - [`cache`] - Idempotency records and applied recipes
//! - [`pipeline`] - Per-target build pipeline
//! - [`publish`] - Signing and output index updates
//! - [`pool`] - Bounded worker pool
//! - [`dispatcher`] - Pass admission and pipeline execution
//! - [`scheduler`] - Periodic passes
//! - [`lifecycle`] - Shutdown, drain and cleanup
//! - [`engine`] - Wiring of all of the above
//! - [`doctor`] - Host dependency checks

pub mod cache;
pub mod dispatcher;
pub mod doctor;
pub mod engine;
pub mod lifecycle;
pub mod pipeline;
pub mod pool;
pub mod publish;
pub mod scheduler;
pub mod settings;
pub mod target;

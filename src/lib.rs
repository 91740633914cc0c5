//! Repowright - periodic rebuilder for a pacman package repository
//!
//! This library provides the build orchestration engine: a bounded worker
//! pool, a periodic scheduler, a per-target idempotency cache and a graceful
//! shutdown controller, wired around pluggable build, signing and publishing
//! backends.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Orchestration logic (pipeline, dispatcher, scheduler, lifecycle)
//! - [`infra`] - Infrastructure layer (network, filesystem, processes)
//! - [`config`] - Constants and defaults
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;

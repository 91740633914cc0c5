//! Infrastructure layer
//!
//! Filesystem, process and tool integrations used by the core engine.

pub mod backend;
pub mod chroot;
pub mod dirs;
pub mod ephemeral;
pub mod fetch;
pub mod filesystem;
pub mod index;
pub mod log_sink;
pub mod process;
pub mod signer;

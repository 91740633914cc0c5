//! Configuration constants
//!
//! - [`defaults`] - Default values and well-known file names
//! - [`urls`] - Upstream URLs

pub mod defaults;
pub mod urls;

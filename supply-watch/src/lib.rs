//! supply-watch library crate.
//!
//! Threshold monitoring for supply-chain resources: classification,
//! deduplicated multi-channel notifications and throttled automatic
//! reordering. Exposed as a library for the binary and integration tests.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod utils;

pub use error::{Error, Result};

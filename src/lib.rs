//! condaprov - cached conda environments for CI runners
//!
//! Restores a conda distribution and a pinned project environment from an
//! artifact cache, installs whatever is missing, and saves the result under a
//! deterministic key for the next run.

pub mod cache;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod history;
pub mod provision;
pub mod ui;

pub use error::{ProvisionError, ProvisionResult};

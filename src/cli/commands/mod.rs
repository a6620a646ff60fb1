//! CLI command implementations

pub mod completions;
pub mod config;
pub mod inputs;
pub mod key;
pub mod provision;
pub mod status;

pub use completions::execute as completions;
pub use config::execute as config;
pub use key::execute as key;
pub use provision::execute as provision;
pub use status::execute as status;

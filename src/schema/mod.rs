//! Schema module - Run configuration and persisted result types.

mod config;
mod record;

pub use config::*;
pub use record::*;

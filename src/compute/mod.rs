//! Compute module - Evolutionary algorithms and their operators.

pub mod evolution;

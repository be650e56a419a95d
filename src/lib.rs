//! matchstats library
//!
//! Collects recent football match statistics from an HTML statistics site and
//! a JSON football API into CSV files. The binary in `main.rs` is a thin
//! wrapper; everything here is also used by the integration tests.

pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod collect;
pub mod config;
pub mod data;
pub mod fetch;
pub mod logging;
pub mod output;

#[cfg(test)]
mod test_support;

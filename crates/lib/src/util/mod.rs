//! Shared utilities.
//!
//! File replacement helpers, subprocess plumbing and test helpers.

pub mod fs;
pub mod process;

#[cfg(test)]
pub mod testutil;

//! Shared utilities.
//!
//! Currently only test helpers for simulating external tools.

#[cfg(test)]
pub mod testutil;

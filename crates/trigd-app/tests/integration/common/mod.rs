//! Shared test harness.

pub mod harness;

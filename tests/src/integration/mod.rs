//! # Integration Scenarios
//!
//! End-to-end behavior of the bus through its public API only.

pub mod isolation;

//! Test utilities and helpers for crdtsync
//!
//! Fixtures for replicas and networks, expressive assertions, async helpers
//! and deterministic randomness shared by the unit and scenario tests.

pub mod assertions;
pub mod async_helpers;
pub mod deterministic_rng;
pub mod fixtures;

pub use assertions::*;
pub use async_helpers::*;
pub use deterministic_rng::*;
pub use fixtures::*;

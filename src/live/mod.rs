//! Live refresh session.

pub mod controller;

pub use controller::{CostReport, LiveRefreshController};

//! Partwright CLI library
//!
//! Plan file loading shared by the `partwright` binary and its tests.

pub mod plan_file;

pub use plan_file::{PlanFile, PlanFileError};

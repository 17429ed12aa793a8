//! Data format used by the red/black grid breakup tool

pub mod format;
pub mod grid;
pub mod parameters;
pub mod text;

/// Computation precision
pub type Precision = f64;


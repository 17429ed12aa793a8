//! Relaxation solver parameters

use crate::Precision;
use std::num::NonZeroU64;

/// Parameters of the relaxation solver that will eventually consume the grid
///
/// These are not interpreted by the breakup tool, only checked for sanity on
/// load and copied unchanged into every chunk file.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Parameters {
    /// Convergence threshold, always >= 0
    pub convergence_threshold: Precision,

    /// Maximal number of solver iterations
    pub max_iterations: NonZeroU64,
}
//
impl Parameters {
    /// Check out if a convergence threshold is acceptable
    ///
    /// NaN is rejected along with negative values.
    pub fn is_valid_threshold(threshold: Precision) -> bool {
        threshold >= 0.0
    }
}
//
impl Default for Parameters {
    fn default() -> Self {
        Self {
            convergence_threshold: 1e-4,
            max_iterations: NonZeroU64::new(1000).expect("1000 is not zero"),
        }
    }
}

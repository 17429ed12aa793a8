//! In-memory representation of a relaxation grid

use crate::{parameters::Parameters, Precision};
use ndarray::{s, Array2, ArrayView2};
use std::ops::RangeInclusive;

/// Grid of values to be relaxed, along with the solver parameters
///
/// Values are stored in row-major order. A grid is never empty: it always has
/// at least one row and one column.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    /// Grid values, element (r, c) lies at linear index `r * cols + c`
    values: Array2<Precision>,

    /// Solver parameters
    parameters: Parameters,
}
//
impl Grid {
    /// Wrap a matrix of values and the associated solver parameters
    ///
    /// # Panics
    ///
    /// If the matrix has no rows or no columns.
    pub fn new(values: Array2<Precision>, parameters: Parameters) -> Self {
        assert!(
            values.nrows() > 0 && values.ncols() > 0,
            "Grids must have at least one row and one column"
        );
        Self { values, parameters }
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    /// Shape of the grid as [rows, cols]
    pub fn shape(&self) -> [usize; 2] {
        [self.rows(), self.cols()]
    }

    /// Solver parameters
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Full view of the grid values
    pub fn values(&self) -> ArrayView2<'_, Precision> {
        self.values.view()
    }

    /// View of a rectangular region, bounds being inclusive
    ///
    /// # Panics
    ///
    /// If the region does not fit inside of the grid.
    pub fn region(
        &self,
        rows: RangeInclusive<usize>,
        cols: RangeInclusive<usize>,
    ) -> ArrayView2<'_, Precision> {
        self.values.slice(s![rows, cols])
    }
}

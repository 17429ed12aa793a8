//! Chunk planning
//!
//! The global grid is cut into a regular lattice of `row_chunks x col_chunks`
//! blocks, numbered in row-major order. Each block uniquely owns an inner
//! region of the grid, and is widened by one line of halo cells on every side
//! where it has a neighbour, so that a relaxation step can be computed locally.
//!
//! ```text
//!            col 0       col 1
//!         +---------+-----------+
//! row 0   | rank 0  |  rank 1   |
//!         +---------+-----------+   <- rank 0 and rank 2 each see one
//! row 1   | rank 2  |  rank 3   |      row of the other as halo
//!         +---------+-----------+
//! ```

use std::{
    fmt::{self, Display},
    num::NonZeroUsize,
    ops::RangeInclusive,
};
use thiserror::Error;

/// Minimal number of cells along each dimension of a chunk, halo included
///
/// A chunk needs at least one cell of its own plus a neighbour on each side
/// to run one relaxation stencil.
pub const MIN_CHUNK_LEN: usize = 3;

/// Number of chunks along each axis of the grid
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChunkLayout {
    /// Number of chunks along the row axis (chunk rows)
    row_chunks: NonZeroUsize,

    /// Number of chunks along the column axis (chunk columns)
    col_chunks: NonZeroUsize,
}
//
impl ChunkLayout {
    /// Set up a layout of `row_chunks` chunk rows and `col_chunks` chunk columns
    pub fn new(row_chunks: NonZeroUsize, col_chunks: NonZeroUsize) -> Self {
        Self {
            row_chunks,
            col_chunks,
        }
    }

    /// Number of chunk rows
    pub fn row_chunks(&self) -> usize {
        self.row_chunks.get()
    }

    /// Number of chunk columns
    pub fn col_chunks(&self) -> usize {
        self.col_chunks.get()
    }

    /// Total number of chunks, i.e. of ranks
    pub fn num_ranks(&self) -> usize {
        self.row_chunks().saturating_mul(self.col_chunks())
    }

    /// Position of a rank's chunk in the chunk lattice, as [chunk_row, chunk_col]
    pub fn chunk_position(&self, rank: usize) -> [usize; 2] {
        [rank / self.col_chunks(), rank % self.col_chunks()]
    }
}
//
impl Default for ChunkLayout {
    fn default() -> Self {
        Self::new(NonZeroUsize::MIN, NonZeroUsize::MIN)
    }
}
//
impl Display for ChunkLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.row_chunks, self.col_chunks)
    }
}

/// Inclusive range of grid indices along one axis
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Extent {
    /// First index
    pub start: usize,

    /// Last index, never lower than `start`
    pub end: usize,
}
//
impl Extent {
    /// Number of indices covered
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Range of indices covered
    pub fn range(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    /// Truth that an index is covered
    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }
}
//
impl Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Region of the global grid that is handed over to one rank
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChunkDescriptor {
    /// Rank of the chunk
    pub rank: usize,

    /// Position of the chunk in the chunk lattice, as [chunk_row, chunk_col]
    pub position: [usize; 2],

    /// Rows of the chunk, halo included
    pub rows: Extent,

    /// Columns of the chunk, halo included
    pub cols: Extent,

    /// Rows owned by this chunk only
    pub inner_rows: Extent,

    /// Columns owned by this chunk only
    pub inner_cols: Extent,
}
//
impl ChunkDescriptor {
    /// Local shape of the chunk as [rows, cols], halo included
    pub fn shape(&self) -> [usize; 2] {
        [self.rows.len(), self.cols.len()]
    }
}
//
impl Display for ChunkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk for rank {} is rows {}, columns {}",
            self.rank, self.rows, self.cols
        )
    }
}

/// Compute the region of the grid that a rank will receive
///
/// `grid_shape` is the global grid shape as [rows, cols].
pub fn plan(
    rank: usize,
    grid_shape: [usize; 2],
    layout: ChunkLayout,
) -> Result<ChunkDescriptor, Error> {
    let [inner_rows, inner_cols] = inner_region(rank, grid_shape, layout)?;
    let position @ [chunk_row, chunk_col] = layout.chunk_position(rank);
    let rows = add_halo(inner_rows, chunk_row, layout.row_chunks());
    let cols = add_halo(inner_cols, chunk_col, layout.col_chunks());

    if rows.len() < MIN_CHUNK_LEN || cols.len() < MIN_CHUNK_LEN {
        return Err(Error::TooSmall {
            rank,
            rows: rows.len(),
            cols: cols.len(),
        });
    }

    Ok(ChunkDescriptor {
        rank,
        position,
        rows,
        cols,
        inner_rows,
        inner_cols,
    })
}

/// Compute the chunk of every rank, in rank order
pub fn plan_all(
    grid_shape: [usize; 2],
    layout: ChunkLayout,
) -> impl Iterator<Item = Result<ChunkDescriptor, Error>> {
    (0..layout.num_ranks()).map(move |rank| plan(rank, grid_shape, layout))
}

/// Compute the region of the grid that a rank uniquely owns, without halo,
/// as [rows, cols]
///
/// The inner regions of all ranks of a layout tile the grid exactly.
pub fn inner_region(
    rank: usize,
    [grid_rows, grid_cols]: [usize; 2],
    layout: ChunkLayout,
) -> Result<[Extent; 2], Error> {
    let num_ranks = layout.num_ranks();
    if rank >= num_ranks {
        return Err(Error::RankOutOfRange { rank, num_ranks });
    }
    for (axis, len, chunks) in [
        (Axis::Rows, grid_rows, layout.row_chunks()),
        (Axis::Cols, grid_cols, layout.col_chunks()),
    ] {
        if chunks > len {
            return Err(Error::TooManyChunks { axis, len, chunks });
        }
    }

    let [chunk_row, chunk_col] = layout.chunk_position(rank);
    Ok([
        inner_extent(chunk_row, layout.row_chunks(), grid_rows),
        inner_extent(chunk_col, layout.col_chunks(), grid_cols),
    ])
}

/// Inner extent of chunk `index` out of `num_chunks` along an axis of `len`
/// cells
///
/// Truncating division spreads the remainder of uneven splits over the chunks
/// without any explicit rebalancing. Products are computed in 128-bit so that
/// any `usize` grid length can be split.
fn inner_extent(index: usize, num_chunks: usize, len: usize) -> Extent {
    debug_assert!(index < num_chunks && num_chunks <= len);
    // Boundary of chunk i is i * len / num_chunks <= len, so it fits in usize
    let boundary = |i: usize| (i as u128 * len as u128 / num_chunks as u128) as usize;
    Extent {
        start: boundary(index),
        end: boundary(index + 1) - 1,
    }
}

/// Widen an inner extent by one halo cell towards each neighbouring chunk
fn add_halo(inner: Extent, index: usize, num_chunks: usize) -> Extent {
    let mut extent = inner;
    if index > 0 {
        extent.start -= 1;
    }
    if index < num_chunks - 1 {
        extent.end += 1;
    }
    extent
}

/// Axis of the grid
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Axis {
    /// Vertical axis, along which rows are stacked
    Rows,

    /// Horizontal axis, along which columns are stacked
    Cols,
}
//
impl Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rows => "rows",
            Self::Cols => "columns",
        })
    }
}

/// Ways in which a chunk layout can be incompatible with a grid
#[derive(Clone, Debug, Error, Eq, Hash, PartialEq)]
pub enum Error {
    /// Requested a rank that the layout does not have
    #[error("rank {rank} is out of range, layout only has {num_ranks} ranks")]
    RankOutOfRange { rank: usize, num_ranks: usize },

    /// Some chunks would not own any cell of the grid
    #[error("cannot split {len} {axis} into {chunks} chunks")]
    TooManyChunks {
        axis: Axis,
        len: usize,
        chunks: usize,
    },

    /// A chunk would be smaller than [`MIN_CHUNK_LEN`] along some axis
    #[error(
        "invalid breakup specified for this grid: chunk for rank {rank} would be \
         {rows}x{cols} cells, but chunks must be at least 3 cells in all dimensions"
    )]
    TooSmall {
        rank: usize,
        rows: usize,
        cols: usize,
    },
}

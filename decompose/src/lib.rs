//! Domain decomposition of relaxation grids
//!
//! This crate cuts a global grid into overlapping chunks, one per rank of a
//! parallel red/black relaxation solver, and writes each chunk to its own file
//! named after the rank. Every chunk carries one line of halo cells towards
//! each of its neighbours, so that ranks can run a relaxation step without
//! exchanging data.

pub mod plan;
pub mod subgrid;

use crate::plan::{ChunkDescriptor, ChunkLayout};
use data::{
    grid::Grid,
    text::{self, Config, HeaderOrder},
};
use log::{debug, info};
use rayon::prelude::*;
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};
use thiserror::Error;

/// Breakup of a grid file into chunk files
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Breakup {
    /// Path to the global grid file
    pub input: PathBuf,

    /// Base name of chunk files, rank `r` goes to `{output_base}.{r}`
    pub output_base: PathBuf,

    /// Number of chunks along each axis
    pub layout: ChunkLayout,

    /// Write chunks in parallel
    ///
    /// Ranks are then completed in no particular order. After the first
    /// failure, no new rank is started, but ranks that were already in flight
    /// are allowed to finish.
    pub parallel: bool,
}
//
impl Breakup {
    /// Perform the breakup
    pub fn run(&self) -> Result<Summary, Error> {
        self.run_with(|_, _| {})
    }

    /// Perform the breakup, calling `on_chunk_written` after each chunk file
    /// has been successfully written
    ///
    /// Chunk files that were written before a failure are left in place, the
    /// error tells how many there are.
    pub fn run_with(
        &self,
        on_chunk_written: impl Fn(&ChunkDescriptor, &Path) + Sync,
    ) -> Result<Summary, Error> {
        let grid = text::load(Config {
            file_name: &self.input,
            header_order: HeaderOrder::RowsFirst,
        })
        .map_err(|source| Error::Load {
            path: self.input.clone(),
            source,
        })?;
        debug!(
            "Loaded {}x{} grid from {}",
            grid.rows(),
            grid.cols(),
            self.input.display()
        );

        if self.parallel {
            self.write_parallel(&grid, &on_chunk_written)
        } else {
            self.write_sequential(&grid, &on_chunk_written)
        }
    }

    /// Write chunks one by one in rank order, stopping at the first failure
    fn write_sequential(
        &self,
        grid: &Grid,
        on_chunk_written: &(impl Fn(&ChunkDescriptor, &Path) + Sync),
    ) -> Result<Summary, Error> {
        let num_ranks = self.layout.num_ranks();
        let mut chunks = Vec::with_capacity(num_ranks);
        for rank in 0..num_ranks {
            let (chunk, path) = self.write_rank(grid, rank).map_err(|source| Error::Rank {
                rank,
                completed: chunks.len(),
                num_ranks,
                source,
            })?;
            on_chunk_written(&chunk, &path);
            chunks.push(path);
        }
        Ok(Summary { chunks })
    }

    /// Write chunks in parallel, not starting new ranks after a failure
    fn write_parallel(
        &self,
        grid: &Grid,
        on_chunk_written: &(impl Fn(&ChunkDescriptor, &Path) + Sync),
    ) -> Result<Summary, Error> {
        let num_ranks = self.layout.num_ranks();
        let failed = AtomicBool::new(false);
        let outcomes = (0..num_ranks)
            .into_par_iter()
            .map(|rank| {
                if failed.load(Ordering::Relaxed) {
                    return None;
                }
                let outcome = self.write_rank(grid, rank);
                match &outcome {
                    Ok((chunk, path)) => on_chunk_written(chunk, path),
                    Err(_) => failed.store(true, Ordering::Relaxed),
                }
                Some(outcome.map(|(_chunk, path)| path))
            })
            .collect::<Vec<_>>();

        let mut chunks = Vec::with_capacity(num_ranks);
        let mut first_failure = None;
        for (rank, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(path)) => chunks.push(path),
                Some(Err(source)) if first_failure.is_none() => {
                    first_failure = Some((rank, source))
                }
                Some(Err(_)) | None => {}
            }
        }
        match first_failure {
            None => Ok(Summary { chunks }),
            Some((rank, source)) => Err(Error::Rank {
                rank,
                completed: chunks.len(),
                num_ranks,
                source,
            }),
        }
    }

    /// Plan and write the chunk of one rank
    ///
    /// The chunk is planned before its file is created, so no file is left
    /// behind by ranks with an invalid chunk.
    fn write_rank(
        &self,
        grid: &Grid,
        rank: usize,
    ) -> Result<(ChunkDescriptor, PathBuf), ChunkError> {
        let chunk = plan::plan(rank, grid.shape(), self.layout)?;
        debug!("{chunk}");
        let path = subgrid::chunk_path(&self.output_base, rank);
        info!("writing data for rank {rank} to {}", path.display());
        subgrid::create_chunk_file(grid, &chunk, &path)?;
        Ok((chunk, path))
    }
}

/// Outcome of a successful breakup
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    /// Paths of the chunk files, in rank order
    pub chunks: Vec<PathBuf>,
}
//
impl Summary {
    /// Number of chunk files written
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }
}

/// Broad category of breakup errors
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// The grid file could not be parsed
    Format,

    /// The grid file holds unacceptable header values
    Validation,

    /// The chunk layout does not suit the grid
    Configuration,

    /// The operating system reported an I/O error
    Io,
}
//
impl From<text::ErrorKind> for ErrorKind {
    fn from(kind: text::ErrorKind) -> Self {
        match kind {
            text::ErrorKind::Format => Self::Format,
            text::ErrorKind::Validation => Self::Validation,
            text::ErrorKind::Io => Self::Io,
        }
    }
}

/// Things that can go wrong while processing one rank
#[derive(Debug, Error)]
pub enum ChunkError {
    /// The chunk layout does not suit the grid
    #[error(transparent)]
    Plan(#[from] plan::Error),

    /// The chunk file could not be written
    #[error(transparent)]
    Io(#[from] text::Error),
}

/// Things that can go wrong when breaking up a grid
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to load the global grid, nothing was written
    #[error("failed to load grid from {}", path.display())]
    Load { path: PathBuf, source: text::Error },

    /// Failed to process a rank, earlier ranks were written
    #[error("failed to process rank {rank} ({completed} of {num_ranks} chunks written)")]
    Rank {
        rank: usize,
        completed: usize,
        num_ranks: usize,
        source: ChunkError,
    },
}
//
impl Error {
    /// Broad category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load { source, .. } => source.kind().into(),
            Self::Rank {
                source: ChunkError::Plan(_),
                ..
            } => ErrorKind::Configuration,
            Self::Rank {
                source: ChunkError::Io(source),
                ..
            } => source.kind().into(),
        }
    }

    /// Number of chunk files that were successfully written before the failure
    pub fn completed(&self) -> usize {
        match self {
            Self::Load { .. } => 0,
            Self::Rank { completed, .. } => *completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data::{parameters::Parameters, text::Writer, Precision};
    use ndarray::Array2;
    use std::{
        fs,
        num::{NonZeroU64, NonZeroUsize},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Once,
        },
    };
    use tempfile::TempDir;

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    fn layout(row_chunks: usize, col_chunks: usize) -> ChunkLayout {
        ChunkLayout::new(
            NonZeroUsize::new(row_chunks).unwrap(),
            NonZeroUsize::new(col_chunks).unwrap(),
        )
    }

    /// Scratch directory holding a grid file of the given shape
    fn grid_file(shape: [usize; 2]) -> (TempDir, PathBuf) {
        init_logger();
        let dir = tempfile::tempdir().expect("Failed to create scratch directory");
        let path = dir.path().join("grid.txt");
        let values = Array2::from_shape_fn(shape, |(r, c)| (r * shape[1] + c) as Precision);
        let params = Parameters {
            convergence_threshold: 1e-3,
            max_iterations: NonZeroU64::new(200).unwrap(),
        };
        let mut writer = Writer::create(Config {
            file_name: &path,
            header_order: HeaderOrder::RowsFirst,
        })
        .expect("Failed to create grid file");
        writer
            .write(values.view(), &params)
            .expect("Failed to write grid file");
        writer.close().expect("Failed to close grid file");
        (dir, path)
    }

    fn breakup(dir: &TempDir, input: PathBuf, layout: ChunkLayout) -> Breakup {
        Breakup {
            input,
            output_base: dir.path().join("chunk"),
            layout,
            parallel: false,
        }
    }

    fn chunk_exists(dir: &TempDir, rank: usize) -> bool {
        subgrid::chunk_path(dir.path().join("chunk"), rank).exists()
    }

    #[test]
    fn four_by_four_in_two_row_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let (dir, input) = grid_file([4, 4]);
        let summary = breakup(&dir, input, layout(2, 1)).run()?;
        assert_eq!(summary.num_chunks(), 2);

        let top = subgrid::load_chunk_file(&summary.chunks[0])?;
        assert_eq!(top.shape(), [3, 4]);
        assert_eq!(top.values().row(0).to_vec(), [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(top.values().row(2).to_vec(), [8.0, 9.0, 10.0, 11.0]);

        let bottom = subgrid::load_chunk_file(&summary.chunks[1])?;
        assert_eq!(bottom.shape(), [3, 4]);
        assert_eq!(bottom.values().row(0).to_vec(), [4.0, 5.0, 6.0, 7.0]);
        assert_eq!(bottom.values().row(2).to_vec(), [12.0, 13.0, 14.0, 15.0]);
        assert_eq!(bottom.parameters().max_iterations.get(), 200);
        Ok(())
    }

    #[test]
    fn chunks_too_small() {
        let (dir, input) = grid_file([3, 3]);
        let error = breakup(&dir, input, layout(2, 2)).run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert_eq!(error.completed(), 0);
        assert!(matches!(error, Error::Rank { rank: 0, .. }));
        assert!((0..4).all(|rank| !chunk_exists(&dir, rank)));
    }

    #[test]
    fn fail_fast_keeps_earlier_chunks() {
        // A directory squatting the path of rank 4 makes its creation fail
        let (dir, input) = grid_file([9, 9]);
        fs::create_dir(subgrid::chunk_path(dir.path().join("chunk"), 4)).unwrap();
        let error = breakup(&dir, input, layout(3, 3)).run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(matches!(
            error,
            Error::Rank {
                rank: 4,
                completed: 4,
                num_ranks: 9,
                ..
            }
        ));
        assert!((0..4).all(|rank| chunk_exists(&dir, rank)));
        assert!((5..9).all(|rank| !chunk_exists(&dir, rank)));
    }

    #[test]
    fn missing_iteration_count() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("grid.txt");
        fs::write(&input, "4\n4\n0.001\n").unwrap();
        let error = breakup(&dir, input, layout(1, 1)).run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Format);
        assert_eq!(error.completed(), 0);
        assert!(!chunk_exists(&dir, 0));
    }

    #[test]
    fn missing_input() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let error = breakup(&dir, dir.path().join("nope.txt"), layout(1, 1))
            .run()
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("nope.txt"));
    }

    #[test]
    fn unwritable_output() {
        let (dir, input) = grid_file([6, 6]);
        let breakup = Breakup {
            output_base: dir.path().join("missing-dir").join("chunk"),
            ..breakup(&dir, input, layout(2, 2))
        };
        let error = breakup.run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(matches!(error, Error::Rank { rank: 0, completed: 0, .. }));
    }

    #[test]
    fn idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let (dir, input) = grid_file([10, 12]);
        let breakup = breakup(&dir, input, layout(2, 3));
        let first = breakup
            .run()?
            .chunks
            .iter()
            .map(fs::read)
            .collect::<Result<Vec<_>, _>>()?;
        let second = breakup
            .run()?
            .chunks
            .iter()
            .map(fs::read)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn parallel_matches_sequential() -> Result<(), Box<dyn std::error::Error>> {
        let (dir, input) = grid_file([20, 15]);
        let sequential = breakup(&dir, input.clone(), layout(3, 2));
        let expected = sequential
            .run()?
            .chunks
            .iter()
            .map(fs::read)
            .collect::<Result<Vec<_>, _>>()?;

        let written = AtomicUsize::new(0);
        let parallel = Breakup {
            output_base: dir.path().join("parallel"),
            parallel: true,
            ..sequential
        };
        let summary = parallel.run_with(|_, _| {
            written.fetch_add(1, Ordering::Relaxed);
        })?;
        assert_eq!(written.load(Ordering::Relaxed), 6);
        assert_eq!(summary.chunks[5], dir.path().join("parallel.5"));
        let actual = summary
            .chunks
            .iter()
            .map(fs::read)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(actual, expected);
        Ok(())
    }

    #[test]
    fn parallel_failure() {
        let (dir, input) = grid_file([9, 9]);
        fs::create_dir(subgrid::chunk_path(dir.path().join("chunk"), 4)).unwrap();
        let breakup = Breakup {
            parallel: true,
            ..breakup(&dir, input, layout(3, 3))
        };
        let error = breakup.run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Io);
        let &Error::Rank {
            rank, completed, ..
        } = &error
        else {
            panic!("Expected a rank failure, got {error}")
        };
        assert_eq!(rank, 4);
        assert!(completed < 9);
        let written = (0..9)
            .filter(|&rank| rank != 4 && chunk_exists(&dir, rank))
            .count();
        assert_eq!(written, completed);
    }

    #[test]
    fn parallel_configuration_failure() {
        let (dir, input) = grid_file([3, 3]);
        let breakup = Breakup {
            parallel: true,
            ..breakup(&dir, input, layout(2, 2))
        };
        let error = breakup.run().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert_eq!(error.completed(), 0);
        assert!((0..4).all(|rank| !chunk_exists(&dir, rank)));
    }

    #[test]
    fn observer_sees_every_chunk_in_order() -> Result<(), Error> {
        let (dir, input) = grid_file([9, 9]);
        let seen = std::sync::Mutex::new(Vec::new());
        breakup(&dir, input, layout(3, 3)).run_with(|chunk, path| {
            assert!(path.ends_with(format!("chunk.{}", chunk.rank)));
            seen.lock().unwrap().push(chunk.rank);
        })?;
        assert_eq!(seen.into_inner().unwrap(), (0..9).collect::<Vec<_>>());
        Ok(())
    }
}

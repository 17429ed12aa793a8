//! Serialization of chunks to chunk files

use crate::plan::ChunkDescriptor;
use data::{
    grid::Grid,
    text::{self, Config, HeaderOrder, Writer},
};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Header layout of chunk files: column count first, then row count
pub const CHUNK_HEADER_ORDER: HeaderOrder = HeaderOrder::ColsFirst;

/// Path of the chunk file of a rank, `{base}.{rank}`
pub fn chunk_path(base: impl AsRef<Path>, rank: usize) -> PathBuf {
    let mut path = base.as_ref().as_os_str().to_owned();
    path.push(format!(".{rank}"));
    path.into()
}

/// Write a chunk of the grid into some destination
///
/// The output uses the grid file format, with the chunk's local dimensions in
/// the header and the solver parameters copied from the global grid. The
/// destination is flushed before returning. On error, it may contain a
/// partially written chunk, which the caller should discard.
pub fn write_chunk(grid: &Grid, chunk: &ChunkDescriptor, output: impl Write) -> text::Result<()> {
    let mut writer = Writer::new(output, CHUNK_HEADER_ORDER);
    write_region(&mut writer, grid, chunk)?;
    writer.into_inner()?;
    Ok(())
}

/// Create or truncate a chunk file, then write a chunk into it
pub fn create_chunk_file(
    grid: &Grid,
    chunk: &ChunkDescriptor,
    path: impl AsRef<Path>,
) -> text::Result<()> {
    let mut writer = Writer::create(Config {
        file_name: path,
        header_order: CHUNK_HEADER_ORDER,
    })?;
    write_region(&mut writer, grid, chunk)?;
    writer.close()
}

/// Write the region of the grid covered by a chunk, halo included
fn write_region<W: Write>(
    writer: &mut Writer<W>,
    grid: &Grid,
    chunk: &ChunkDescriptor,
) -> text::Result<()> {
    writer.write(
        grid.region(chunk.rows.range(), chunk.cols.range()),
        grid.parameters(),
    )
}

/// Load a chunk file back as a grid of the chunk's local shape
pub fn load_chunk_file(path: impl AsRef<Path>) -> text::Result<Grid> {
    text::load(Config {
        file_name: path,
        header_order: CHUNK_HEADER_ORDER,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan, ChunkLayout};
    use data::{parameters::Parameters, Precision};
    use ndarray::Array2;
    use std::{
        error::Error as _,
        io,
        num::{NonZeroU64, NonZeroUsize},
    };

    /// 4x4 grid holding values 0..15 in row-major order
    fn counting_grid() -> Grid {
        let values = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as Precision);
        Grid::new(
            values,
            Parameters {
                convergence_threshold: 0.001,
                max_iterations: NonZeroU64::new(500).unwrap(),
            },
        )
    }

    fn two_row_chunks() -> ChunkLayout {
        ChunkLayout::new(NonZeroUsize::new(2).unwrap(), NonZeroUsize::MIN)
    }

    #[test]
    fn chunk_paths() {
        assert_eq!(chunk_path("sample.txt", 0), PathBuf::from("sample.txt.0"));
        assert_eq!(chunk_path("out/grid", 12), PathBuf::from("out/grid.12"));
    }

    #[test]
    fn write_top_chunk() -> Result<(), Box<dyn std::error::Error>> {
        let grid = counting_grid();
        let chunk = plan(0, grid.shape(), two_row_chunks())?;
        let mut output = Vec::new();
        write_chunk(&grid, &chunk, &mut output)?;
        assert_eq!(
            String::from_utf8(output)?,
            "4\n3\n0.001\n500\n\
             \x20     0       1       2       3 \n\
             \x20     4       5       6       7 \n\
             \x20     8       9      10      11 \n"
        );
        Ok(())
    }

    #[test]
    fn write_bottom_chunk() -> Result<(), Box<dyn std::error::Error>> {
        let grid = counting_grid();
        let chunk = plan(1, grid.shape(), two_row_chunks())?;
        let mut output = Vec::new();
        write_chunk(&grid, &chunk, &mut output)?;
        let text = String::from_utf8(output)?;
        let mut lines = text.lines().skip(4);
        assert_eq!(lines.next(), Some("      4       5       6       7 "));
        assert_eq!(lines.next(), Some("      8       9      10      11 "));
        assert_eq!(lines.next(), Some("     12      13      14      15 "));
        assert_eq!(lines.next(), None);
        Ok(())
    }

    /// Destination that accepts a number of bytes, then runs out of space
    struct FillsUpAfter(usize);
    //
    impl Write for FillsUpAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::other("no space left on device"));
            }
            let len = buf.len().min(self.0);
            self.0 -= len;
            Ok(len)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_fails_midway() -> Result<(), Box<dyn std::error::Error>> {
        let grid = counting_grid();
        let chunk = plan(0, grid.shape(), two_row_chunks())?;
        let error = write_chunk(&grid, &chunk, FillsUpAfter(20)).unwrap_err();
        assert_eq!(error.kind(), text::ErrorKind::Io);
        let source = error.source().expect("I/O errors keep their cause");
        assert!(source.to_string().contains("no space left on device"));
        Ok(())
    }

    #[test]
    fn file_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let values = Array2::from_shape_fn((7, 9), |(r, c)| {
            (r as Precision + 1.0) / (c as Precision + 3.0)
        });
        let grid = Grid::new(values, Parameters::default());
        let layout = ChunkLayout::new(
            NonZeroUsize::new(2).unwrap(),
            NonZeroUsize::new(3).unwrap(),
        );

        for rank in 0..layout.num_ranks() {
            let chunk = plan(rank, grid.shape(), layout)?;
            let path = chunk_path(dir.path().join("grid"), rank);
            create_chunk_file(&grid, &chunk, &path)?;

            let loaded = load_chunk_file(&path)?;
            assert_eq!(loaded.shape(), chunk.shape());
            assert_eq!(loaded.parameters(), grid.parameters());
            let expected = grid.region(chunk.rows.range(), chunk.cols.range());
            for (&actual, &expected) in loaded.values().iter().zip(expected.iter()) {
                assert!((actual - expected).abs() <= 1e-5 * expected.abs());
            }
        }
        Ok(())
    }
}

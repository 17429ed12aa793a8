//! Moving grids to and from whitespace-delimited text files
//!
//! A grid file is a sequence of whitespace-separated tokens: a 4-field header
//! made of the two grid dimensions, the solver's convergence threshold and its
//! maximal iteration count, followed by the grid values in row-major order.

use crate::{format::General, grid::Grid, parameters::Parameters, Precision};
use log::debug;
use ndarray::{Array2, ArrayView2};
use std::{
    borrow::Cow,
    fmt::{self, Display},
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    num::NonZeroU64,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Result type of grid file I/O
pub type Result<T> = std::result::Result<T, Error>;

/// Order in which grid dimensions appear in a file header
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum HeaderOrder {
    /// Number of rows, then number of columns (global input grids)
    #[default]
    RowsFirst,

    /// Number of columns, then number of rows (chunk files)
    ColsFirst,
}
//
impl HeaderOrder {
    /// Header fields in file order
    pub fn fields(self) -> [HeaderField; 4] {
        use HeaderField::*;
        match self {
            Self::RowsFirst => [Rows, Cols, Threshold, MaxIterations],
            Self::ColsFirst => [Cols, Rows, Threshold, MaxIterations],
        }
    }
}

/// Field of a grid file header
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum HeaderField {
    /// Number of grid rows
    Rows,

    /// Number of grid columns
    Cols,

    /// Convergence threshold of the solver
    Threshold,

    /// Maximal number of solver iterations
    MaxIterations,
}
//
impl Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rows => "row count",
            Self::Cols => "column count",
            Self::Threshold => "convergence threshold",
            Self::MaxIterations => "max iteration count",
        })
    }
}

/// Common configuration for reading and writing grid files
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config<FileName: AsRef<Path>> {
    /// Name of the file to be accessed
    pub file_name: FileName,

    /// Order of the dimensions in the file header
    pub header_order: HeaderOrder,
}

/// Load a grid file in one go
pub fn load(config: Config<impl AsRef<Path>>) -> Result<Grid> {
    Reader::open(config)?.read()
}

/// Mechanism to read a grid from a text source
#[derive(Debug)]
pub struct Reader<R: Read> {
    /// Text source
    input: R,

    /// Expected header layout
    header_order: HeaderOrder,
}
//
impl Reader<BufReader<File>> {
    /// Open an existing file
    pub fn open(config: Config<impl AsRef<Path>>) -> Result<Self> {
        let path = config.file_name.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file), config.header_order))
    }
}
//
impl<R: Read> Reader<R> {
    /// Read a grid from an arbitrary text source
    pub fn new(input: R, header_order: HeaderOrder) -> Self {
        Self {
            input,
            header_order,
        }
    }

    /// Read the header and values, then release the text source
    pub fn read(mut self) -> Result<Grid> {
        let mut bytes = Vec::new();
        self.input.read_to_end(&mut bytes).map_err(Error::Read)?;
        // Tokens are decoded one by one, bytes past the last value are ignored
        let mut tokens = bytes
            .split(u8::is_ascii_whitespace)
            .filter(|token| !token.is_empty())
            .map(String::from_utf8_lossy);

        let header = Header::parse(&mut tokens, self.header_order)?;
        let [rows, cols] = header.shape;
        debug!("Loading {rows}x{cols} grid with {:?}", header.parameters);

        // Every value needs at least one byte of text, which bounds the
        // allocation even if the header announces a huge grid
        let num_values = rows
            .checked_mul(cols)
            .ok_or(Error::TooLarge { rows, cols })?;
        let mut values = Vec::with_capacity(num_values.min(bytes.len()));
        for row in 0..rows {
            for col in 0..cols {
                let token = tokens.next().ok_or(Error::MissingValue { row, col })?;
                let value = token.parse::<Precision>().map_err(|_| Error::InvalidValue {
                    row,
                    col,
                    token: token.into_owned(),
                })?;
                values.push(value);
            }
        }

        let values = Array2::from_shape_vec((rows, cols), values)
            .expect("Value count was checked against the grid shape");
        Ok(Grid::new(values, header.parameters))
    }
}

/// Decoded and validated file header
struct Header {
    /// Grid shape as [rows, cols]
    shape: [usize; 2],

    /// Solver parameters
    parameters: Parameters,
}
//
impl Header {
    /// Parse the four header fields, then check them
    fn parse<'text>(
        tokens: &mut impl Iterator<Item = Cow<'text, str>>,
        header_order: HeaderOrder,
    ) -> Result<Self> {
        let mut rows = 0;
        let mut cols = 0;
        let mut threshold = 0.0;
        let mut max_iterations = 0;
        for field in header_order.fields() {
            let token = tokens.next().ok_or(Error::MissingHeaderField { field })?;
            let invalid = || Error::InvalidHeaderField {
                field,
                token: token.to_string(),
            };
            match field {
                HeaderField::Rows => rows = token.parse::<i64>().map_err(|_| invalid())?,
                HeaderField::Cols => cols = token.parse::<i64>().map_err(|_| invalid())?,
                HeaderField::Threshold => {
                    threshold = token.parse::<Precision>().map_err(|_| invalid())?
                }
                HeaderField::MaxIterations => {
                    max_iterations = token.parse::<i64>().map_err(|_| invalid())?
                }
            }
        }

        if rows <= 0 || cols <= 0 {
            return Err(Error::NonPositiveDimension { rows, cols });
        }
        let max_iterations = u64::try_from(max_iterations)
            .ok()
            .and_then(NonZeroU64::new)
            .ok_or(Error::NonPositiveIterations(max_iterations))?;
        if !Parameters::is_valid_threshold(threshold) {
            return Err(Error::NegativeThreshold(threshold));
        }

        let too_large = |_| Error::TooLarge {
            rows: rows as usize,
            cols: cols as usize,
        };
        Ok(Self {
            shape: [
                usize::try_from(rows).map_err(too_large)?,
                usize::try_from(cols).map_err(too_large)?,
            ],
            parameters: Parameters {
                convergence_threshold: threshold,
                max_iterations,
            },
        })
    }
}

/// Mechanism to write a grid into a text destination
#[derive(Debug)]
pub struct Writer<W: Write> {
    /// Text destination
    output: W,

    /// Header layout to be emitted
    header_order: HeaderOrder,

    /// Path of the destination, if it is a file
    path: Option<PathBuf>,
}
//
impl Writer<BufWriter<File>> {
    /// Create or truncate a file
    pub fn create(config: Config<impl AsRef<Path>>) -> Result<Self> {
        let path = config.file_name.as_ref();
        let file = File::create(path).map_err(|source| Error::Create {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self {
            path: Some(path.to_owned()),
            ..Self::new(BufWriter::new(file), config.header_order)
        })
    }
}
//
impl<W: Write> Writer<W> {
    /// Write into an arbitrary text destination
    pub fn new(output: W, header_order: HeaderOrder) -> Self {
        Self {
            output,
            header_order,
            path: None,
        }
    }

    /// Write a header and a matrix of values
    ///
    /// Values are printed with 6 significant digits in `%7g ` style, one line
    /// per row, so they can be loaded back by [`Reader`].
    pub fn write(
        &mut self,
        values: ArrayView2<'_, Precision>,
        parameters: &Parameters,
    ) -> Result<()> {
        self.write_impl(values, parameters)
            .map_err(|source| self.write_error(source))
    }

    /// Flush buffered output and hand back the destination
    ///
    /// This would otherwise happen on Drop for buffered files, but doing it
    /// manually allows you to catch and handle errors.
    pub fn into_inner(mut self) -> Result<W> {
        self.output
            .flush()
            .map_err(|source| self.write_error(source))?;
        Ok(self.output)
    }

    /// Flush buffered output and close the destination
    pub fn close(self) -> Result<()> {
        self.into_inner().map(drop)
    }

    /// Attach the destination's path, if known, to a write error
    fn write_error(&self, source: io::Error) -> Error {
        match &self.path {
            Some(path) => Error::WriteFile {
                path: path.clone(),
                source,
            },
            None => Error::Write(source),
        }
    }

    /// Implementation of `write()` with raw I/O errors
    fn write_impl(
        &mut self,
        values: ArrayView2<'_, Precision>,
        parameters: &Parameters,
    ) -> io::Result<()> {
        let out = &mut self.output;
        for field in self.header_order.fields() {
            match field {
                HeaderField::Rows => writeln!(out, "{}", values.nrows())?,
                HeaderField::Cols => writeln!(out, "{}", values.ncols())?,
                HeaderField::Threshold => {
                    writeln!(out, "{}", General::new(parameters.convergence_threshold))?
                }
                HeaderField::MaxIterations => writeln!(out, "{}", parameters.max_iterations)?,
            }
        }
        for row in values.rows() {
            for &value in row {
                write!(out, "{:>7} ", General::new(value))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Broad category of grid file errors
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// The text could not be parsed as a grid
    Format,

    /// The grid was parsed, but its header holds unacceptable values
    Validation,

    /// The operating system reported an I/O error
    Io,
}

/// Things that can go wrong when reading or writing grid files
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to open an input file
    #[error("unable to open input file {}", path.display())]
    Open { path: PathBuf, source: io::Error },

    /// Failed to create an output file
    #[error("unable to create output file {}", path.display())]
    Create { path: PathBuf, source: io::Error },

    /// Failed to read from the text source
    #[error("failed to read grid data")]
    Read(#[source] io::Error),

    /// Failed to write into the text destination
    #[error("failed to write grid data")]
    Write(#[source] io::Error),

    /// Failed to write into an output file
    #[error("failed to write grid data to {}", path.display())]
    WriteFile { path: PathBuf, source: io::Error },

    /// Header ended before this field
    #[error("error reading header: missing {field}")]
    MissingHeaderField { field: HeaderField },

    /// Header field could not be parsed
    #[error("error reading header: invalid {field} {token:?}")]
    InvalidHeaderField { field: HeaderField, token: String },

    /// A grid dimension is zero or negative
    #[error("non-positive dimension: grid must have more than 0 rows and columns, got {rows}x{cols}")]
    NonPositiveDimension { rows: i64, cols: i64 },

    /// Iteration count is zero or negative
    #[error("non-positive iteration count: max iterations must be greater than 0, got {0}")]
    NonPositiveIterations(i64),

    /// Convergence threshold is negative or NaN
    #[error("negative threshold: epsilon must be 0.0 or greater, got {0}")]
    NegativeThreshold(Precision),

    /// Grid is too large to be addressed in memory
    #[error("grid of {rows}x{cols} elements cannot be addressed in memory")]
    TooLarge { rows: usize, cols: usize },

    /// Data ended before this value
    #[error("error reading grid data at ({row}, {col}): missing value")]
    MissingValue { row: usize, col: usize },

    /// A value could not be parsed
    #[error("error reading grid data at ({row}, {col}): invalid value {token:?}")]
    InvalidValue { row: usize, col: usize, token: String },
}
//
impl Error {
    /// Broad category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { .. }
            | Self::Create { .. }
            | Self::Read(_)
            | Self::Write(_)
            | Self::WriteFile { .. } => ErrorKind::Io,
            Self::MissingHeaderField { .. }
            | Self::InvalidHeaderField { .. }
            | Self::MissingValue { .. }
            | Self::InvalidValue { .. } => ErrorKind::Format,
            Self::NonPositiveDimension { .. }
            | Self::NonPositiveIterations(_)
            | Self::NegativeThreshold(_)
            | Self::TooLarge { .. } => ErrorKind::Validation,
        }
    }
}

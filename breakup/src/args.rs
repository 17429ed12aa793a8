//! Command-line arguments

use clap::{Args, Parser};
use decompose::plan::ChunkLayout;
use std::{ffi::OsString, num::NonZeroUsize, path::PathBuf};

/// Break up a grid file into overlapping chunks for parallel red/black
/// relaxation, chunk files are named after the input file and the rank
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Name of the input file to break up
    ///
    /// With --combine, files named FILENAME.rank would be combined.
    #[arg(
        long = "in",
        value_name = "FILENAME",
        default_value = "sample.txt",
        allow_hyphen_values = true
    )]
    pub input: PathBuf,

    /// Base name of the chunk files, which will be written to FILENAME.rank
    ///
    /// Defaults to the input file name.
    #[arg(long = "out", value_name = "FILENAME", allow_hyphen_values = true)]
    pub output: Option<PathBuf>,

    /// Number of columnwise chunks to break the grid into
    #[arg(long, value_name = "N", default_value_t = NonZeroUsize::MIN)]
    pub ichunk: NonZeroUsize,

    /// Number of rowwise chunks to break the grid into
    #[arg(long, value_name = "N", default_value_t = NonZeroUsize::MIN)]
    pub jchunk: NonZeroUsize,

    /// Combine chunk files back into a grid (not implemented yet)
    #[arg(long)]
    pub combine: bool,

    /// Print the extent of every chunk without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Parallel processing options
    #[command(flatten)]
    pub parallel: ParallelArgs,
}
//
impl Cli {
    /// Parse the process' command-line arguments, legacy spellings included
    pub fn parse_legacy() -> Self {
        Self::parse_from(modernize(std::env::args_os()))
    }

    /// Base name of the chunk files
    pub fn output_base(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| self.input.clone())
    }

    /// Requested chunk layout
    ///
    /// Rowwise chunks stack along the row axis, columnwise chunks along the
    /// column axis.
    pub fn layout(&self) -> ChunkLayout {
        ChunkLayout::new(self.jchunk, self.ichunk)
    }
}

/// CLI parameters for parallel chunk writing
#[derive(Args, Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ParallelArgs {
    /// Write chunk files in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Number of processing threads, used with --parallel
    #[arg(long, value_name = "N", requires = "parallel")]
    pub num_threads: Option<NonZeroUsize>,
}

/// Single-dash options from the historical interface, and whether they take a
/// value
const LEGACY_OPTIONS: [(&str, bool); 6] = [
    ("-help", false),
    ("-in", true),
    ("-out", true),
    ("-ichunk", true),
    ("-jchunk", true),
    ("-combine", false),
];

/// Translate the historical single-dash command-line syntax (`-in grid.txt`,
/// `-help`, `/?`) into the double-dash syntax that clap understands
///
/// Option values are passed through untouched, even if they look like options.
fn modernize(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut args = args.into_iter();
    let mut result = Vec::new();
    result.extend(args.next());
    while let Some(arg) = args.next() {
        let legacy = arg.to_str().and_then(|arg| {
            if arg == "/?" {
                return Some(("-help", false));
            }
            LEGACY_OPTIONS.iter().copied().find(|(name, _)| *name == arg)
        });
        match legacy {
            Some((name, takes_value)) => {
                result.push(format!("-{name}").into());
                if takes_value {
                    result.extend(args.next());
                }
            }
            None => result.push(arg),
        }
    }
    result
}

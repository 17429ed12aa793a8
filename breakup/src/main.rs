mod args;
mod tui;

use crate::args::Cli;
use data::text::{self, Config, HeaderOrder};
use decompose::{plan, Breakup};
use eyre::{bail, Result, WrapErr};
use log::info;
use rayon::ThreadPoolBuilder;
use std::path::Path;

fn main() -> Result<()> {
    tui::init_logging();

    // Parse CLI arguments and handle clap-incompatible defaults
    let cli = Cli::parse_legacy();
    if cli.combine {
        bail!("the combine operation is not implemented, only breakup is supported");
    }
    let layout = cli.layout();
    if cli.dry_run {
        return print_plan(&cli.input, layout);
    }

    // Configure parallel processing
    if let Some(num_threads) = cli.parallel.num_threads {
        ThreadPoolBuilder::new()
            .num_threads(num_threads.into())
            .build_global()
            .wrap_err("failed to configure thread pool")?;
    }

    // Break up the grid file, reporting progress as chunks get written
    info!("Red/Black Breakup - processing file {}", cli.input.display());
    let breakup = Breakup {
        input: cli.input.clone(),
        output_base: cli.output_base(),
        layout,
        parallel: cli.parallel.parallel,
    };
    let progress = tui::init_progress_reporting(
        format!("Breaking up {} into {layout} chunks", cli.input.display()),
        layout.num_ranks(),
    );
    let result = breakup.run_with(|_chunk, _path| progress.inc(1));
    if result.is_ok() {
        progress.finish();
    } else {
        progress.abandon();
    }
    let summary = result.wrap_err_with(|| format!("failed to break up {}", cli.input.display()))?;
    info!("Wrote {} chunk files", summary.num_chunks());
    Ok(())
}

/// Print the chunk of every rank, without writing any file
fn print_plan(input: &Path, layout: plan::ChunkLayout) -> Result<()> {
    let grid = text::load(Config {
        file_name: input,
        header_order: HeaderOrder::RowsFirst,
    })
    .wrap_err_with(|| format!("failed to load grid from {}", input.display()))?;
    println!(
        "{}x{} grid, {layout} chunks, {} ranks",
        grid.rows(),
        grid.cols(),
        layout.num_ranks()
    );
    for chunk in plan::plan_all(grid.shape(), layout) {
        let chunk = chunk.wrap_err("chunk layout does not suit the grid")?;
        let [rows, cols] = chunk.shape();
        println!("{chunk} ({rows}x{cols} cells)");
    }
    Ok(())
}

//! `demfuse`: fuse 3D maps into a DEM from the command line.

use clap::Parser;
use demfuse_core::FusionMode;
use demfuse_runner::{execute, Overrides, RunFile};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Fuse N 3D maps into one DEM grid
#[derive(Parser, Debug)]
#[command(name = "demfuse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML run file
    run_file: PathBuf,

    /// Number of accumulation workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Fusion mode (min, max, mean, acc)
    #[arg(short, long)]
    mode: Option<FusionMode>,

    /// DEM grid step in target units
    #[arg(short, long)]
    grid_step: Option<f64>,

    /// Print the effective run file and exit
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    demfuse_metrics::describe_metrics();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> demfuse_runner::Result<()> {
    let mut run = RunFile::load(&args.run_file)?;
    run.apply(&Overrides {
        workers: args.workers,
        mode: args.mode,
        grid_step: args.grid_step,
    });

    if args.dry_run {
        print!("{}", serde_yaml::to_string(&run)?);
        return Ok(());
    }

    let dem = execute(&run)?;
    let total = dem.report.total();
    info!(
        "{} cells filled of {}, {} samples accepted, {} skipped",
        dem.grid.filled_cells(),
        dem.grid.geometry().len(),
        total.accepted,
        total.skipped()
    );
    Ok(())
}

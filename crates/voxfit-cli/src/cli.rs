use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "voxfit CLI - Fit discrete atomic structures to voxelized density grids and render structures back into grids.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a density grid from an atom table, then fit a structure back to it.
    Fit(FitArgs),
    /// Render a density grid from an atom table and export its voxel values.
    Render(RenderArgs),
}

/// Arguments for the `fit` subcommand.
#[derive(Args, Debug)]
pub struct FitArgs {
    // --- Core Arguments ---
    /// Path to the input atom table (CSV with element,x,y,z columns).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the fitted atom table output.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the typing scheme table from the config file.
    #[arg(short = 't', long, value_name = "PATH")]
    pub typer: Option<PathBuf>,

    // --- Grid Overrides ---
    /// Override the grid resolution from the config file.
    #[arg(short = 'r', long, value_name = "FLOAT")]
    pub resolution: Option<f64>,

    /// Override the physical grid dimension from the config file.
    #[arg(short = 'd', long, value_name = "FLOAT")]
    pub dimension: Option<f64>,

    // --- Detection Overrides ---
    /// Override the detection threshold.
    #[arg(long, value_name = "FLOAT")]
    pub threshold: Option<f64>,

    /// Override the non-maximum suppression distance.
    #[arg(long, value_name = "FLOAT")]
    pub min_dist: Option<f64>,

    /// Override the detected-atom cap.
    #[arg(short = 'n', long, value_name = "INT")]
    pub n_atoms: Option<usize>,

    // --- Search Overrides ---
    /// Disable add-atom moves, overriding the config file.
    #[arg(long)]
    pub no_growth: bool,

    /// Disable remove-atom moves, overriding the config file.
    #[arg(long)]
    pub no_pruning: bool,

    /// Override the maximum number of search iterations.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,
}

/// Arguments for the `render` subcommand.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path to the input atom table (CSV with element,x,y,z columns).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the voxel-value table output.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the typing scheme table from the config file.
    #[arg(short = 't', long, value_name = "PATH")]
    pub typer: Option<PathBuf>,

    /// Override the grid resolution from the config file.
    #[arg(short = 'r', long, value_name = "FLOAT")]
    pub resolution: Option<f64>,

    /// Override the physical grid dimension from the config file.
    #[arg(short = 'd', long, value_name = "FLOAT")]
    pub dimension: Option<f64>,

    /// Only export voxels with a value above this floor.
    #[arg(long, value_name = "FLOAT", default_value_t = 1e-4)]
    pub min_value: f64,
}

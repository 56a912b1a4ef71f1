//! blurkit - Gaussian blur engine CLI
//!
//! Batch front end for the blur engine: single blurs, simulated slider
//! sweeps through the debounce coordinator, and kernel inspection.

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod io;
mod logging;

#[derive(Parser)]
#[command(name = "blurkit")]
#[command(author, version, about = "Asynchronous Gaussian blur engine CLI")]
#[command(long_about = "
Blurs 8-bit PNG images with the blurkit engine.

Examples:
  blurkit blur photo.png -o soft.png -i 2.5      # Single blur
  blurkit blur photo.png -o prev.png -i 4 --progressive
  blurkit sweep photo.png --values 0.5,1,1.5,2 -d out/
  blurkit sweep photo.png --from 0 --to 5 --step 0.25 --interval-ms 30
  blurkit kernel 1.5 --weights                  # Inspect the kernel
  blurkit -c engine.ron -j 4 blur in.png -o out.png -i 3
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Worker threads (negative = one per CPU)
    #[arg(short = 'j', long, global = true, allow_hyphen_values = true)]
    threads: Option<i32>,

    /// Engine configuration file (RON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Blur one image at a fixed intensity
    #[command(visible_alias = "b")]
    Blur(BlurArgs),

    /// Replay a slider sweep through the debounced coordinator
    #[command(visible_alias = "s")]
    Sweep(SweepArgs),

    /// Show sigma, size and weights of the kernel for an intensity
    #[command(visible_alias = "k")]
    Kernel(KernelArgs),
}

#[derive(Args)]
struct BlurArgs {
    /// Input PNG
    input: PathBuf,

    /// Output PNG
    #[arg(short, long)]
    output: PathBuf,

    /// Blur intensity (0.0 - 10.0)
    #[arg(short, long, default_value = "1.0")]
    intensity: f64,

    /// Half-sigma preview quality
    #[arg(long)]
    progressive: bool,

    /// Seconds to wait for the result
    #[arg(long, default_value = "60")]
    timeout: u64,
}

#[derive(Args)]
struct SweepArgs {
    /// Input PNG
    input: PathBuf,

    /// Comma-separated slider positions
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["from", "to"])]
    values: Vec<f64>,

    /// Sweep start
    #[arg(long, default_value = "0.0")]
    from: f64,

    /// Sweep end
    #[arg(long, default_value = "5.0")]
    to: f64,

    /// Sweep increment
    #[arg(long, default_value = "0.5")]
    step: f64,

    /// Milliseconds between slider moves
    #[arg(long, default_value = "150")]
    interval_ms: u64,

    /// Debounce delay override in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Write every delivered blur here as <stem>_<intensity>.png
    #[arg(short = 'd', long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct KernelArgs {
    /// Blur intensity (0.0 - 10.0)
    intensity: f64,

    /// Print the individual weights
    #[arg(short, long)]
    weights: bool,

    /// Use progressive (half sigma) quality
    #[arg(long)]
    progressive: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = commands::load_config(cli.config.as_deref(), cli.threads)?;

    match cli.command {
        Commands::Blur(args) => commands::blur::run(args, &config, cli.verbose),
        Commands::Sweep(args) => commands::sweep::run(args, config, cli.verbose),
        Commands::Kernel(args) => commands::kernel::run(args),
    }
}

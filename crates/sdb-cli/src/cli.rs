use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sdbctl",
    about = "Inspect and maintain state database region files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Database configuration (TOML) supplying region sizing
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty region file
    Init(InitArgs),
    /// Show the header, type table, and usage of a region
    Info(PathArgs),
    /// Verify every block, checksum, and index root
    Check(PathArgs),
    /// Extend a region file
    Grow(GrowArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: PathBuf,
    /// Initial size in bytes
    #[arg(long)]
    pub size: Option<u64>,
    /// Upper bound for automatic growth in bytes
    #[arg(long)]
    pub max_size: Option<u64>,
}

#[derive(Args)]
pub struct PathArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct GrowArgs {
    pub path: PathBuf,
    /// Bytes to add (rounded up to the block alignment)
    #[arg(long)]
    pub by: u64,
}

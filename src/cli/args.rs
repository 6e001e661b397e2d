use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to harness config YAML file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging for internal details
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenario suites against the configured CLI and platform
    Run(RunArgs),
    /// Print the scenarios a suite expands to
    Show(ShowArgs),
    /// Print generated fixture names
    Names(NamesArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Suite files or directories (defaults to `suites/`)
    pub suites: Vec<PathBuf>,

    /// Number of scenarios run in parallel
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Only run scenarios whose name matches this regex
    #[arg(long)]
    pub focus: Option<String>,

    /// Skip scenarios whose name matches this regex
    #[arg(long)]
    pub skip: Option<String>,

    /// Write a JSON report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Suite file to expand
    pub suite: PathBuf,
}

#[derive(Args, Debug)]
pub struct NamesArgs {
    /// Resource kind (org, space, app, user, quota, ...)
    pub kind: String,

    /// How many names to generate
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,
}

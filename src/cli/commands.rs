//! CLI command definitions

use crate::shipper::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Args;
use std::path::PathBuf;

/// Run the log pipeline until interrupted
#[derive(Debug, Args, Clone)]
pub struct ServeCommand {
    /// Path to pipeline YAML file (defaults to the built-in stack)
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

/// Validate a pipeline or workflow descriptor
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Kind of descriptor
    #[arg(long, value_enum, default_value_t = DescriptorKind::Pipeline)]
    pub kind: DescriptorKind,

    /// Print the parsed descriptor as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the triage workflow for one issue event
#[derive(Debug, Args, Clone)]
pub struct TriageCommand {
    /// Path to workflow YAML file (defaults to the built-in workflow)
    #[arg(short, long)]
    pub workflow: Option<PathBuf>,

    /// Path to the event payload
    #[arg(short, long, env = "GITHUB_EVENT_PATH")]
    pub event: PathBuf,

    /// Repository (`owner/name`); overrides the event and GITHUB_REPOSITORY
    #[arg(long)]
    pub repo: Option<String>,

    /// Run against an in-memory copy of the issue instead of the API
    #[arg(long)]
    pub dry_run: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Ship a folder of log files to the raw socket listener
#[derive(Debug, Args, Clone)]
pub struct ShipCommand {
    /// Folder to read log files from
    #[arg(short, long)]
    pub folder: PathBuf,

    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Give up after this many connection attempts (default: retry forever)
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

/// Show workflow run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Write the default descriptors
#[derive(Debug, Args, Clone)]
pub struct InitCommand {
    /// Target directory
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

/// Descriptor kind argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DescriptorKind {
    Pipeline,
    Workflow,
}

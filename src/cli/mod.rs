//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, InitCommand, ServeCommand, ShipCommand, TriageCommand, ValidateCommand};
use std::ffi::OsString;

/// Log pipeline and issue triage automation
#[derive(Debug, Parser, Clone)]
#[command(name = "logship")]
#[command(version)]
#[command(about = "Log ingestion pipeline and issue triage automation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the log pipeline until Ctrl-C
    Serve(ServeCommand),

    /// Validate a pipeline or workflow descriptor
    Validate(ValidateCommand),

    /// Run the triage workflow for an issue event
    Triage(TriageCommand),

    /// Ship log files to the raw socket listener
    Ship(ShipCommand),

    /// Show workflow run history
    History(HistoryCommand),

    /// Write the default descriptors
    Init(InitCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

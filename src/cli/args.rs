//! Command-line argument parsing for sparkmcp
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sparkmcp - plan, authorize and execute tool calls
#[derive(Parser, Debug)]
#[command(name = "sparkmcp")]
#[command(version)]
#[command(about = "Plan, authorize and execute tool calls with result caching", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: default (config level), -v (debug), -vv (trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print execution metrics after the command
    #[arg(long, global = true)]
    pub stats: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan and execute a JSON request ("-" reads it from stdin)
    Run {
        /// Request such as {"tool_name": "calculate", "parameters": {...}}
        #[arg(value_name = "REQUEST")]
        request: String,

        /// Credential identifying the caller
        #[arg(short, long, env = "SPARKMCP_TOKEN")]
        token: String,
    },

    /// List registered tools
    Tools,

    /// Display current configuration
    Config,
}

impl Args {
    /// Log filter directive for the given configured level
    pub fn log_level(&self, configured: &str) -> String {
        match self.verbose {
            0 => configured.to_lowercase(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }

    /// Whether the request should be read from stdin
    pub fn reads_stdin(&self) -> bool {
        matches!(&self.command, Commands::Run { request, .. } if request == "-")
    }
}

//! CLI command definitions for task-lists-mcp
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RunFormat {
    /// Markdown digest (default)
    #[default]
    Markdown,
    /// Pretty-printed JSON
    Json,
}

/// Task Lists MCP Server and CLI tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server (default if no subcommand given)
    Serve,

    /// Run a saved list and print its tasks
    Run {
        /// List id or short id
        list: String,

        /// Maximum tasks (defaults to lists.default_limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Output format
        #[arg(long, value_enum, default_value_t = RunFormat::Markdown)]
        format: RunFormat,
    },

    /// Print all saved lists
    Lists,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["task-lists-mcp"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
    }

    #[test]
    fn run_subcommand() {
        let cli = Cli::parse_from(["task-lists-mcp", "run", "today", "--limit", "5", "--format", "json"]);
        match cli.command {
            Some(Command::Run { list, limit, format }) => {
                assert_eq!(list, "today");
                assert_eq!(limit, Some(5));
                assert_eq!(format, RunFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// TripWeaver - conversational trip planning worker
#[derive(Parser)]
#[command(
    name = "tw",
    about = "Context assembly, retrieval and plan generation for trip-planning chats",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Feed requests from a JSONL file into the queue and run the worker
    Run {
        /// One JSON request per line
        #[arg(short, long)]
        requests: PathBuf,

        /// Keep polling after the file is drained (stop with Ctrl-C)
        #[arg(short, long)]
        follow: bool,
    },

    /// Run a single turn and print the plan
    Plan {
        /// Request JSON file
        request: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Print the anchors extracted from messages, oldest first
    Anchors {
        /// Messages
        #[arg(required = true)]
        messages: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the normalized intent for a request
    Normalize {
        /// Request JSON file
        request: PathBuf,
    },

    /// Long-term memory maintenance
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
}

/// Long-term memory subcommands
#[derive(Debug, Subcommand)]
pub enum MemoryCommand {
    /// Delete every memory of a thread
    DeleteThread {
        /// Thread id
        thread_id: String,
    },

    /// Delete all memories
    Purge {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripweaver")
        .join("logs")
        .join("tripweaver.log")
}

/// Output format for plan and anchor output
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

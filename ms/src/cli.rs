//! CLI argument parsing for memorystore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ms")]
#[command(author, version, about = "Keyed text store with similarity search", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the store directory
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Insert or replace a record
    Upsert {
        /// Record ID
        #[arg(required = true)]
        id: String,

        /// Record text
        #[arg(required = true)]
        text: String,

        /// Collection name
        #[arg(short = 'C', long)]
        collection: Option<String>,

        /// Metadata entries as key=value
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// Query a collection by similarity
    Query {
        /// Query text
        #[arg(required = true)]
        text: String,

        /// Collection name
        #[arg(short = 'C', long)]
        collection: Option<String>,

        /// Maximum hits
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Metadata filter, e.g. thread_id=t1,role=user
        #[arg(short, long = "where")]
        filter: Option<String>,
    },

    /// Delete records by id
    Delete {
        /// Record IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Collection name
        #[arg(short = 'C', long)]
        collection: Option<String>,
    },

    /// Delete every record matching a metadata filter
    DeleteWhere {
        /// Metadata filter, e.g. thread_id=t1
        #[arg(required = true)]
        filter: String,

        /// Collection name
        #[arg(short = 'C', long)]
        collection: Option<String>,
    },

    /// Load a {"docs": [...]} seed file
    Seed {
        /// Seed file path
        #[arg(required = true)]
        file: PathBuf,

        /// Collection name (default: travel_docs)
        #[arg(short = 'C', long)]
        collection: Option<String>,
    },

    /// Remove every record in a collection
    Clear {
        /// Collection name
        #[arg(required = true)]
        collection: String,
    },

    /// Show statistics for a collection
    Stats {
        /// Collection name
        #[arg(required = true)]
        collection: String,
    },

    /// List all collections
    List,
}

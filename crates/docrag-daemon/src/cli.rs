//! CLI argument parsing for docrag.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// docrag
///
/// Document ingestion, embedding and retrieval pipeline.
#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/docrag/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the data directory
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload local files and enqueue their chunks
    Ingest {
        /// Files to upload; each is stored under its file name
        files: Vec<PathBuf>,

        /// Ingest every stored object under this key prefix instead
        #[arg(long, conflicts_with = "files")]
        prefix: Option<String>,
    },

    /// Run the queue consumer until interrupted
    Consume {
        /// Exit once the queue is drained
        #[arg(long)]
        once: bool,
    },

    /// Retrieve the chunks closest to a query
    Query {
        query: String,

        /// Number of chunks to return (default from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Serve POST /search and run the consumer in the same process
    Serve {
        /// Override the bind address
        #[arg(long)]
        addr: Option<String>,
    },

    /// Remove a document's metadata and stored object
    Delete {
        /// Document ID (its object key)
        doc_id: String,
    },

    /// Show queue, index and metadata state
    Status,

    /// Print the effective configuration as TOML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest_files() {
        let cli = Cli::parse_from(["docrag", "ingest", "a.pdf", "b.docx"]);
        match cli.command {
            Commands::Ingest { files, prefix } => {
                assert_eq!(files.len(), 2);
                assert!(prefix.is_none());
            }
            _ => panic!("Expected Ingest"),
        }
    }

    #[test]
    fn test_parse_ingest_prefix_conflicts_with_files() {
        assert!(Cli::try_parse_from(["docrag", "ingest", "a.pdf", "--prefix", "x/"]).is_err());
        assert!(Cli::try_parse_from(["docrag", "ingest", "--prefix", "x/"]).is_ok());
    }

    #[test]
    fn test_parse_query_with_globals() {
        let cli = Cli::parse_from([
            "docrag",
            "query",
            "tidal energy",
            "-k",
            "5",
            "--data-dir",
            "/tmp/docrag",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/docrag"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Query { query, top_k } => {
                assert_eq!(query, "tidal energy");
                assert_eq!(top_k, Some(5));
            }
            _ => panic!("Expected Query"),
        }
    }

    #[test]
    fn test_parse_consume_once() {
        let cli = Cli::parse_from(["docrag", "consume", "--once"]);
        assert!(matches!(cli.command, Commands::Consume { once: true }));
    }
}

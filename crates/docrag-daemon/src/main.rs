//! docrag
//!
//! # Usage
//!
//! ```bash
//! docrag ingest report.pdf notes.docx
//! docrag consume
//! docrag query "what changed in the third quarter" -k 3
//! docrag serve --addr 127.0.0.1:8080
//! ```
//!
//! # Configuration
//!
//! Loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/docrag/config.toml)
//! 3. Environment variables (DOCRAG_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use docrag_daemon::{
    handle_delete, handle_ingest, handle_query, init_logging, load_settings, run_consumer,
    show_config, show_status, start_server, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(
        cli.config.as_deref(),
        cli.log_level.as_deref(),
        cli.data_dir.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Ingest { files, prefix } => {
            handle_ingest(&settings, &files, prefix.as_deref()).await?;
        }
        Commands::Consume { once } => {
            run_consumer(&settings, once).await?;
        }
        Commands::Query { query, top_k } => {
            handle_query(&settings, &query, top_k).await?;
        }
        Commands::Serve { addr } => {
            start_server(&settings, addr.as_deref()).await?;
        }
        Commands::Delete { doc_id } => {
            handle_delete(&settings, &doc_id).await?;
        }
        Commands::Status => {
            show_status(&settings).await?;
        }
        Commands::Config => {
            show_config(&settings)?;
        }
    }

    Ok(())
}

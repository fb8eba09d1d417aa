//! docrag daemon library exports.
//!
//! - `cli`: command-line parsing with clap
//! - `commands`: command implementations
//! - `http`: the `/search` HTTP surface

pub mod cli;
pub mod commands;
pub mod http;

pub use cli::{Cli, Commands};
pub use commands::{
    handle_delete, handle_ingest, handle_query, init_logging, load_settings, run_consumer,
    show_config, show_status, start_server, Components,
};
pub use http::{router, AppState, SearchRequest};

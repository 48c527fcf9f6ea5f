//! Command-line interface components
//!
//! This module contains CLI-specific code for the CMS Fetcher application,
//! including argument parsing, progress display and the command handlers.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    AuthAction, AuthArgs, BucketAction, BucketArgs, Cli, Commands, ConfigAction, ConfigArgs,
    ExtractArgs, FilesArgs, GlobalArgs, IngestArgs, WindowArgs,
};
pub use commands::{
    handle_auth, handle_bucket, handle_config, handle_devices, handle_extract, handle_files,
    handle_ingest, CommandContext,
};
pub use progress::{ProgressDisplay, ProgressTally};

//! CLI module for shardmerge
//!
//! Provides command-line interface for:
//! - merge: Replay a captured fan-out through the merge engine
//! - validate: Check a merge spec

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    load_config, load_spec, merge, merge_captured, run, run_command, validate, CapturedOutcome,
    CapturedShard, CapturedTxn, ShardInput,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_file, read_request, write_error, write_response};

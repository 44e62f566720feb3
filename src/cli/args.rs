//! CLI argument definitions using clap
//!
//! Commands:
//! - shardmerge merge --spec <path> [--shards <path>] [--config <path>]
//! - shardmerge validate --spec <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shardmerge - A strict, deterministic resultset merge engine for sharded query fan-out
#[derive(Parser, Debug)]
#[command(name = "shardmerge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge captured shard resultsets and print the merged rows
    Merge {
        /// Path to the merge spec (JSON)
        #[arg(long)]
        spec: PathBuf,

        /// Path to the captured shard resultsets (JSON); read from stdin when omitted
        #[arg(long)]
        shards: Option<PathBuf>,

        /// Path to the merge configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check a merge spec without merging anything
    Validate {
        /// Path to the merge spec (JSON)
        #[arg(long)]
        spec: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merge() {
        let cli = Cli::try_parse_from([
            "shardmerge",
            "merge",
            "--spec",
            "spec.json",
            "--shards",
            "shards.json",
        ])
        .unwrap();
        match cli.command {
            Command::Merge {
                spec,
                shards,
                config,
            } => {
                assert_eq!(spec, PathBuf::from("spec.json"));
                assert_eq!(shards, Some(PathBuf::from("shards.json")));
                assert!(config.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_validate_requires_spec() {
        assert!(Cli::try_parse_from(["shardmerge", "validate"]).is_err());
    }
}

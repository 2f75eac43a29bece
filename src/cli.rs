//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Time-partitioned dataset access with offline-capable caching.
///
/// Timeshard resolves date-range queries against manifest-indexed partition
/// files, fetching through a durable cache so queries keep answering -
/// with labeled, degraded data - when the network is down.
#[derive(Parser, Debug)]
#[command(name = "timeshard")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to the cache database
    #[arg(long, default_value = "timeshard-cache.db")]
    pub cache: PathBuf,

    /// Cache generation tag; entries under other tags are purged on startup
    #[arg(long, default_value = "timeshard-v1")]
    pub generation: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Query a date range from a dataset and print the result as JSON
    Query {
        /// Dataset identifier (e.g. casualties)
        dataset: String,

        /// URL of the dataset's manifest document
        #[arg(long)]
        manifest: String,

        /// First day of the range, inclusive (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// First day past the range, exclusive (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Refresh the manifest and warm the cache for the recent window
    Refresh {
        /// Dataset identifier (e.g. casualties)
        dataset: String,

        /// URL of the dataset's manifest document
        #[arg(long)]
        manifest: String,

        /// Width of the trailing window to warm, in days (1-365)
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=365))]
        window_days: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_command() {
        let args = Args::parse_from([
            "timeshard",
            "query",
            "casualties",
            "--manifest",
            "https://data.example.org/casualties/manifest.json",
            "--from",
            "2023-12-01",
            "--to",
            "2024-01-15",
        ]);
        match args.command {
            Command::Query { dataset, from, to, pretty, .. } => {
                assert_eq!(dataset, "casualties");
                assert_eq!(from, "2023-12-01");
                assert_eq!(to, "2024-01-15");
                assert!(!pretty);
            }
            Command::Refresh { .. } => panic!("expected query command"),
        }
    }

    #[test]
    fn refresh_window_has_default() {
        let args = Args::parse_from([
            "timeshard",
            "refresh",
            "casualties",
            "--manifest",
            "https://data.example.org/casualties/manifest.json",
        ]);
        match args.command {
            Command::Refresh { window_days, .. } => assert_eq!(window_days, 30),
            Command::Query { .. } => panic!("expected refresh command"),
        }
    }

    #[test]
    fn rejects_zero_day_window() {
        let result = Args::try_parse_from([
            "timeshard",
            "refresh",
            "casualties",
            "--manifest",
            "https://data.example.org/m.json",
            "--window-days",
            "0",
        ]);
        assert!(result.is_err());
    }
}

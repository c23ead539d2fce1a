//! Command-line arguments.
//!
//! Every option can also be set through an `XP3_*` environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level command line
#[derive(Debug, Clone, Parser)]
#[command(name = "xp3", about = "Inspect, extract and build XP3 archives", version)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "XP3_LOG_JSON")]
    pub log_json: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List the entries of a container
    List {
        /// Container to read
        archive: PathBuf,

        /// Print the index as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract entries to a directory
    Extract {
        /// Container to read
        archive: PathBuf,

        /// Entries to extract (all when omitted)
        entries: Vec<String>,

        /// Output directory
        #[arg(short, long, env = "XP3_OUTPUT", default_value = ".")]
        output: PathBuf,

        /// Check each entry against its checksum while extracting
        #[arg(long, env = "XP3_VERIFY")]
        verify: bool,
    },

    /// Check every entry against its checksum
    Verify {
        /// Container to read
        archive: PathBuf,
    },

    /// Build a container from a directory tree
    Pack {
        /// Directory to pack
        input: PathBuf,

        /// Container to write
        #[arg(short, long)]
        output: PathBuf,

        /// Store segments zlib-compressed
        #[arg(long)]
        compress: bool,

        /// Split entries into segments of at most this many bytes
        #[arg(long, env = "XP3_SEGMENT_SIZE")]
        segment_size: Option<usize>,

        /// Store the index zlib-compressed
        #[arg(long)]
        compress_index: bool,

        /// zlib level (0-9)
        #[arg(long, env = "XP3_LEVEL", default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },
}

//! Command-line tool for XP3 archives.
//!
//! The `xp3` binary is a thin wrapper over this library:
//!
//! - `list`: print the index of a container (plain table or JSON)
//! - `extract`: write entries to a directory
//! - `verify`: check every entry against its `adlr` checksum
//! - `pack`: build a container from a directory tree
//!
//! Each command writes its report to a caller-supplied writer and returns a
//! summary value, so the commands can be driven from tests as well as from
//! the binary.
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use xp3_tool::Cli;
//!
//! fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse();
//!     xp3_tool::run(&cli, &mut std::io::stdout().lock())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::{Cli, Command};
pub use error::{ToolError, ToolResult};

use std::io::Write;

/// Dispatch the parsed command line
pub fn run<W: Write>(cli: &Cli, out: &mut W) -> ToolResult<()> {
    match &cli.command {
        Command::List { archive, json } => {
            commands::list(archive, *json, out)?;
        }
        Command::Extract {
            archive,
            entries,
            output,
            verify,
        } => {
            commands::extract(archive, entries, output, *verify, out)?;
        }
        Command::Verify { archive } => {
            commands::verify(archive, out)?;
        }
        Command::Pack {
            input,
            output,
            compress,
            segment_size,
            compress_index,
            level,
        } => {
            let options = commands::PackOptions {
                compress: *compress,
                segment_size: *segment_size,
                compress_index: *compress_index,
                level: *level,
            };
            commands::pack(input, output, &options, out)?;
        }
    }
    Ok(())
}

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::codec::{ALL_CORES, DEFAULT_LEVEL};

/// A high-compression Zstandard archiver for directory trees.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log more detail to stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Compress a directory into a .tar.zst file.
    #[command(alias = "c")]
    Compress {
        /// The folder/directory to be compressed.
        input_dir: PathBuf,

        /// The name of the output .tar.zst archive.
        output_file: PathBuf,

        /// Compression level (1=fastest, 22=max compression).
        #[arg(short, long, value_name = "N", default_value_t = DEFAULT_LEVEL,
              value_parser = clap::value_parser!(i32).range(1..=22))]
        level: i32,

        /// Number of compression threads (0=single-threaded, -1=all available cores).
        #[arg(short, long, default_value_t = ALL_CORES, allow_negative_numbers = true,
              value_parser = clap::value_parser!(i32).range(-1..))]
        threads: i32,
    },

    /// Extract a .tar.zst file into a directory.
    #[command(alias = "x")]
    Extract {
        /// The path to the .tar.zst archive to extract.
        input_file: PathBuf,

        /// The destination directory for extracted files.
        output_dir: PathBuf,
    },

    /// List the contents of an archive without extracting it.
    #[command(alias = "l")]
    List {
        /// The .tar.zst archive to list.
        archive: PathBuf,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Compress { .. } => "compress",
            Commands::Extract { .. } => "extract",
            Commands::List { .. } => "list",
        }
    }
}

/// Parses command-line arguments using `clap`.
///
/// Exits the process with clap's usage message on invalid arguments.
pub fn run() -> Args {
    Args::parse()
}

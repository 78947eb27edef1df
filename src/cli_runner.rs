//! Dispatch for the `zstar` binary: logging setup, the command itself and the
//! human-readable status lines on stdout.

use std::error::Error;
use std::path::Path;

use chrono::DateTime;
use tracing::Level;

use crate::cli::{self, Commands};
use crate::common::{ArchiveEntry, ArchiveSummary, EntryKind};
use crate::pipeline;

/// Parses the command line and runs the selected command.
pub fn run_cli_app() -> Result<(), Box<dyn Error>> {
    let args = cli::run();
    init_logging(args.verbose);
    tracing::debug!(command = args.command.name(), "starting");

    match &args.command {
        Commands::Compress { input_dir, output_file, level, threads } => {
            let thread_label = if *threads == -1 { "all available".to_string() } else { threads.to_string() };
            println!("Starting Zstd compression of '{}' using {} threads...", input_dir.display(), thread_label);
            println!("Output file: {}, Level: {}", output_file.display(), level);

            let summary = pipeline::compress(input_dir, output_file, *level, *threads)?;
            println!("Compression complete! :) {}", describe(&summary));
        }
        Commands::Extract { input_file, output_dir } => {
            println!(
                "Starting Zstd extraction of '{}' to '{}'...",
                input_file.display(),
                output_dir.display()
            );
            let summary = pipeline::decompress(input_file, output_dir)?;
            println!("Extraction complete! :) {}", describe(&summary));
        }
        Commands::List { archive } => {
            let entries = pipeline::list(archive)?;
            for entry in &entries {
                println!("{}", listing_line(entry));
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn describe(summary: &ArchiveSummary) -> String {
    let mut line = format!(
        "({} files, {} directories, {} symlinks, {} bytes",
        summary.files, summary.directories, summary.symlinks, summary.content_bytes
    );
    if summary.hard_links > 0 {
        line.push_str(&format!(", {} hard links", summary.hard_links));
    }
    if summary.skipped > 0 {
        line.push_str(&format!(", {} skipped", summary.skipped));
    }
    if summary.compressed_bytes > 0 {
        line.push_str(&format!(", {} bytes compressed", summary.compressed_bytes));
    }
    line.push(')');
    line
}

/// One `ls -l` style row: type and mode, size, mtime, path and link target.
fn listing_line(entry: &ArchiveEntry) -> String {
    let type_char = match entry.kind {
        EntryKind::File => '-',
        EntryKind::Directory => 'd',
        EntryKind::Symlink { .. } => 'l',
        EntryKind::HardLink { .. } => 'h',
    };
    let mtime = i64::try_from(entry.mtime)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{}{} {:>12} {} {}",
        type_char,
        mode_string(entry.mode),
        entry.size,
        mtime,
        display_path(&entry.path, entry.is_dir())
    );
    match &entry.kind {
        EntryKind::Symlink { target } => line.push_str(&format!(" -> {}", target.display())),
        EntryKind::HardLink { target } => line.push_str(&format!(" link to {}", target.display())),
        _ => {}
    }
    line
}

fn mode_string(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}

fn display_path(path: &Path, is_dir: bool) -> String {
    if is_dir {
        format!("{}/", path.display())
    } else {
        path.display().to_string()
    }
}

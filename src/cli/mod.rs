//! CLI subcommand implementations for the `esedb` binary.
//!
//! Five subcommands drive the reader library from the command line. Argument
//! parsing uses clap derive macros, with the top-level [`app::Cli`] struct
//! and [`app::Commands`] enum in [`app`].
//!
//! Each subcommand module follows the same pattern: an `Options` struct
//! holding the parsed arguments and a `pub fn execute(opts, writer) ->
//! Result<(), EseError>` entry point. The `writer: &mut dyn Write` parameter
//! allows output to be captured in tests or redirected to a file via the
//! global `--output` flag.
//!
//! # Subcommands
//!
//! | Command | Module | Purpose |
//! |---------|--------|---------|
//! | `esedb info` | [`info`] | Print header fields and the full catalog |
//! | `esedb export` | [`export`] | Write one tab-separated file per table |
//! | `esedb pages` | [`pages`] | One-line-per-page structure listing |
//! | `esedb dump` | [`dump`] | Hex dump by page number or absolute offset |
//! | `esedb recover` | [`recover`] | Scan pages unreachable from the catalog |
//!
//! Every subcommand that reports structure supports `--json` through
//! `#[derive(Serialize)]` structs and `serde_json`. Progress bars (via
//! [`indicatif`]) appear for whole-file scans. The `wprintln!` macro wraps
//! `writeln!` to convert `io::Error` into `EseError`.

pub mod app;
pub mod dump;
pub mod export;
pub mod info;
pub mod pages;
pub mod recover;

use crate::ese::database::{EseDb, OpenOptions};
use crate::EseError;

/// Write a line to the given writer, converting io::Error to EseError.
macro_rules! wprintln {
    ($w:expr) => {
        writeln!($w).map_err(|e| $crate::EseError::Io(e.to_string()))
    };
    ($w:expr, $($arg:tt)*) => {
        writeln!($w, $($arg)*).map_err(|e| $crate::EseError::Io(e.to_string()))
    };
}

pub(crate) use wprintln;

use indicatif::{ProgressBar, ProgressStyle};

/// Create a styled progress bar for iterating over pages or records.
pub(crate) fn create_progress_bar(count: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(count);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}})",
                unit
            ))
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

/// Open a database for a subcommand.
pub(crate) fn open_db(file: &str) -> Result<EseDb, EseError> {
    EseDb::open_with_options(file, OpenOptions::default())
}

/// Append recorded warnings to the writer, one per line.
pub(crate) fn report_warnings(
    db: &EseDb,
    writer: &mut dyn std::io::Write,
) -> Result<(), EseError> {
    for warning in db.warnings() {
        wprintln!(writer, "warning: {}", warning)?;
    }
    Ok(())
}

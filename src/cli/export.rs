//! The `esedb export` subcommand: one tab-separated file per table.
//!
//! Creates a `<target>.export/` directory next to the source (or under the
//! given target basename) and streams every record of every selected table
//! through the reader API. Long values are followed and inlined; multi
//! values are joined with `; `. A SIGINT flips the database's cooperative
//! abort flag so a half-written export stops at a record boundary.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;

use crate::cli::app::ExportMode;
use crate::cli::{create_progress_bar, open_db, wprintln};
use crate::ese::catalog::ColumnDefinition;
use crate::ese::record::Value;
use crate::ese::table::{Record, Table};
use crate::util::hex::format_bytes;
use crate::EseError;

/// Options for the `esedb export` subcommand.
pub struct ExportOptions {
    /// Path to the database file.
    pub file: String,
    /// Target basename; the export directory is `<target>.export/`.
    pub target: Option<String>,
    /// Restrict the export to one table.
    pub table: Option<String>,
    /// Which tables to export.
    pub mode: ExportMode,
    /// Append warnings to this log file.
    pub logfile: Option<String>,
}

pub fn execute(opts: &ExportOptions, writer: &mut dyn Write) -> Result<(), EseError> {
    let db = open_db(&opts.file)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        // A second Ctrl-C falls back to the default handler behavior of the
        // already-set flag; registration failure only costs cancellation.
        let _ = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        });
    }

    let base = opts
        .target
        .clone()
        .unwrap_or_else(|| opts.file.clone());
    let export_dir = PathBuf::from(format!("{}.export", base));
    fs::create_dir_all(&export_dir)
        .map_err(|e| EseError::Io(format!("Cannot create {}: {}", export_dir.display(), e)))?;

    let tables = db.tables()?;
    let mut exported = 0usize;
    for table in &tables {
        if let Some(only) = &opts.table {
            if table.name() != only {
                continue;
            }
        }
        if matches!(opts.mode, ExportMode::Tables) && table.name().starts_with("MSys") {
            continue;
        }

        if interrupted.load(Ordering::Relaxed) {
            db.signal_abort();
        }
        export_table(table, &export_dir, writer)?;
        exported += 1;
    }

    if let Some(only) = &opts.table {
        if exported == 0 {
            return Err(EseError::Bounds(format!("No table named {}", only)));
        }
    }

    wprintln!(
        writer,
        "{} {} table(s) to {}",
        "Exported".green(),
        exported,
        export_dir.display()
    )?;

    let warnings = db.warnings();
    if let Some(logfile) = &opts.logfile {
        let mut log = File::options()
            .create(true)
            .append(true)
            .open(logfile)
            .map_err(|e| EseError::Io(format!("Cannot open {}: {}", logfile, e)))?;
        for warning in &warnings {
            writeln!(log, "{}", warning).map_err(|e| EseError::Io(e.to_string()))?;
        }
    } else {
        for warning in &warnings {
            wprintln!(writer, "warning: {}", warning)?;
        }
    }

    Ok(())
}

fn export_table(
    table: &Table<'_>,
    export_dir: &Path,
    writer: &mut dyn Write,
) -> Result<(), EseError> {
    let path = export_dir.join(table.name());
    let mut out = File::create(&path)
        .map_err(|e| EseError::Io(format!("Cannot create {}: {}", path.display(), e)))?;

    // Header line: column names.
    let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
    writeln!(out, "{}", names.join("\t")).map_err(|e| EseError::Io(e.to_string()))?;

    let pb = create_progress_bar(0, "records");
    let mut count = 0u64;
    for record in table.records() {
        let record = match record {
            Ok(record) => record,
            Err(EseError::Aborted) => {
                pb.finish_and_clear();
                return Err(EseError::Aborted);
            }
            Err(error) => return Err(error),
        };

        let mut fields = Vec::with_capacity(table.columns().len());
        for (index, column) in table.columns().iter().enumerate() {
            fields.push(render_value(&record, index, column));
        }
        writeln!(out, "{}", fields.join("\t")).map_err(|e| EseError::Io(e.to_string()))?;
        count += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    wprintln!(writer, "  {}: {} records", table.name(), count)?;
    Ok(())
}

/// Render one column of one record to its tab-separated text form.
///
/// Decode failures render as `<error: ...>` so a single bad value does not
/// lose the rest of the row.
fn render_value(record: &Record<'_>, index: usize, column: &ColumnDefinition) -> String {
    let value = match record.value(index) {
        Ok(value) => value,
        Err(error) => return format!("<error: {}>", error),
    };

    match value {
        Value::Null => String::new(),
        Value::Boolean(v) => (v as u8).to_string(),
        Value::UnsignedByte(v) => v.to_string(),
        Value::Short(v) => v.to_string(),
        Value::UnsignedShort(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::UnsignedLong(v) => v.to_string(),
        Value::Currency(v) | Value::LongLong(v) => v.to_string(),
        Value::IeeeSingle(v) => v.to_string(),
        Value::IeeeDouble(v) => v.to_string(),
        Value::OleDateTime(v) => render_ole_date(v),
        Value::Filetime(v) => render_filetime(v),
        Value::Guid(guid) => render_guid(&guid),
        Value::Text(text) => escape_text(&text),
        Value::Binary(bytes) | Value::Raw(bytes) => format_bytes(&bytes),
        Value::LongValueRef(_) => match record.long_value(index) {
            Ok(lv) => {
                if column.column_type.is_text() {
                    match lv.as_utf8(column.codepage) {
                        Ok(text) => escape_text(&text),
                        Err(error) => format!("<error: {}>", error),
                    }
                } else {
                    match lv.read_all_decompressed() {
                        Ok(bytes) => format_bytes(&bytes),
                        Err(error) => format!("<error: {}>", error),
                    }
                }
            }
            Err(error) => format!("<error: {}>", error),
        },
        Value::MultiValue(_) => match record.multi_value(index) {
            Ok(mv) => {
                let mut parts = Vec::with_capacity(mv.count());
                for element in 0..mv.count() {
                    match mv.typed_element(column, element) {
                        Ok(Value::Text(text)) => parts.push(escape_text(&text)),
                        Ok(Value::Binary(bytes)) => parts.push(format_bytes(&bytes)),
                        Ok(other) => parts.push(format!("{:?}", other)),
                        Err(error) => parts.push(format!("<error: {}>", error)),
                    }
                }
                parts.join("; ")
            }
            Err(error) => format!("<error: {}>", error),
        },
    }
}

fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn render_guid(guid: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        guid[3], guid[2], guid[1], guid[0],
        guid[5], guid[4],
        guid[7], guid[6],
        guid[8], guid[9],
        guid[10], guid[11], guid[12], guid[13], guid[14], guid[15]
    )
}

/// OLE automation date: whole days since 1899-12-30, fraction of a day in
/// the mantissa.
fn render_ole_date(value: f64) -> String {
    use chrono::{Duration, NaiveDate};

    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return value.to_string();
    };
    let days = value.trunc() as i64;
    let seconds = (value.fract().abs() * 86400.0).round() as i64;
    let Some(date) = epoch
        .checked_add_signed(Duration::days(days))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| dt.checked_add_signed(Duration::seconds(seconds)))
    else {
        return value.to_string();
    };
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// FILETIME: 100ns ticks since 1601-01-01 UTC.
fn render_filetime(ticks: u64) -> String {
    use chrono::{Duration, NaiveDate};

    let Some(epoch) = NaiveDate::from_ymd_opt(1601, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return ticks.to_string();
    };
    let seconds = (ticks / 10_000_000) as i64;
    let micros = ((ticks % 10_000_000) / 10) as i64;
    let Some(date) = epoch
        .checked_add_signed(Duration::seconds(seconds))
        .and_then(|dt| dt.checked_add_signed(Duration::microseconds(micros)))
    else {
        return ticks.to_string();
    };
    date.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

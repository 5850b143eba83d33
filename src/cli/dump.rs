//! The `esedb dump` subcommand: raw byte hex dumps.

use std::io::Write;

use crate::cli::{open_db, wprintln};
use crate::ese::io::{DataSource, FileSource};
use crate::util::hex::hex_dump;
use crate::EseError;

/// Options for the `esedb dump` subcommand.
pub struct DumpOptions {
    /// Path to the database file.
    pub file: String,
    /// Page number to dump.
    pub page: Option<u32>,
    /// Absolute byte offset (bypasses page addressing).
    pub offset: Option<u64>,
    /// Number of bytes to dump.
    pub length: Option<usize>,
}

pub fn execute(opts: &DumpOptions, writer: &mut dyn Write) -> Result<(), EseError> {
    if let Some(offset) = opts.offset {
        // Raw offset mode reads the file directly, without page parsing, so
        // it works on files whose header is damaged.
        let length = opts.length.unwrap_or(256);
        let mut source = FileSource::open(&opts.file)?;
        let length = length.min(source.size().saturating_sub(offset) as usize);
        let mut buf = vec![0u8; length];
        source.read_at(offset, &mut buf)?;
        wprintln!(writer, "{}", hex_dump(&buf, offset))?;
        return Ok(());
    }

    let db = open_db(&opts.file)?;
    let page_number = opts.page.unwrap_or(1);
    let page = db.page(page_number)?;
    let data = page.raw();
    let length = opts.length.unwrap_or(data.len()).min(data.len());
    let base = db.header().page_offset(page_number);
    wprintln!(writer, "{}", hex_dump(&data[..length], base))?;
    Ok(())
}

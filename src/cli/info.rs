//! The `esedb info` subcommand: header fields and the catalog.

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{open_db, report_warnings, wprintln};
use crate::ese::header::FileType;
use crate::EseError;

/// Options for the `esedb info` subcommand.
pub struct InfoOptions {
    /// Path to the database file.
    pub file: String,
    /// Show column and index detail for every table.
    pub verbose: bool,
    /// Emit output as JSON.
    pub json: bool,
}

#[derive(Serialize)]
struct InfoReport {
    file: String,
    file_type: &'static str,
    format_version: u32,
    format_revision: u32,
    page_size: u32,
    page_count: u32,
    tables: Vec<TableReport>,
}

#[derive(Serialize)]
struct TableReport {
    name: String,
    identifier: u32,
    root_page: u32,
    column_count: usize,
    index_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    long_value_root: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    columns: Vec<ColumnReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    indexes: Vec<IndexReport>,
}

#[derive(Serialize)]
struct ColumnReport {
    identifier: u32,
    name: String,
    column_type: String,
    codepage: u32,
}

#[derive(Serialize)]
struct IndexReport {
    identifier: u32,
    name: String,
    root_page: u32,
}

pub fn execute(opts: &InfoOptions, writer: &mut dyn Write) -> Result<(), EseError> {
    let db = open_db(&opts.file)?;
    let catalog = db.catalog()?;

    let file_type = match db.file_type() {
        FileType::Database => "database",
        FileType::Streaming => "streaming",
    };
    let (version, revision) = db.format_version();

    let tables: Vec<TableReport> = catalog
        .tables
        .iter()
        .map(|table| TableReport {
            name: table.name.clone(),
            identifier: table.identifier,
            root_page: table.root_page,
            column_count: table.columns.len(),
            index_count: table.indexes.len(),
            long_value_root: table.long_value_root,
            columns: if opts.verbose {
                table
                    .columns
                    .iter()
                    .map(|column| ColumnReport {
                        identifier: column.identifier,
                        name: column.name.clone(),
                        column_type: column.column_type.to_string(),
                        codepage: column.codepage,
                    })
                    .collect()
            } else {
                Vec::new()
            },
            indexes: if opts.verbose {
                table
                    .indexes
                    .iter()
                    .map(|index| IndexReport {
                        identifier: index.identifier,
                        name: index.name.clone(),
                        root_page: index.root_page,
                    })
                    .collect()
            } else {
                Vec::new()
            },
        })
        .collect();

    if opts.json {
        let report = InfoReport {
            file: opts.file.clone(),
            file_type,
            format_version: version,
            format_revision: revision,
            page_size: db.page_size(),
            page_count: db.page_count(),
            tables,
        };
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| EseError::Io(e.to_string()))?;
        wprintln!(writer, "{}", rendered)?;
        return Ok(());
    }

    wprintln!(writer, "{}", "Extensible Storage Engine Database".bold())?;
    wprintln!(writer, "  File:            {}", opts.file)?;
    wprintln!(writer, "  Type:            {}", file_type)?;
    wprintln!(
        writer,
        "  Format:          {:#x} revision {:#x}",
        version,
        revision
    )?;
    wprintln!(writer, "  Page size:       {}", db.page_size())?;
    wprintln!(writer, "  Pages:           {}", db.page_count())?;
    wprintln!(writer)?;
    wprintln!(writer, "{} ({})", "Tables".bold(), tables.len())?;

    for table in &tables {
        wprintln!(
            writer,
            "  {}  (id {}, root page {}, {} columns, {} indexes{})",
            table.name.cyan(),
            table.identifier,
            table.root_page,
            table.column_count,
            table.index_count,
            match table.long_value_root {
                Some(root) => format!(", long values at {}", root),
                None => String::new(),
            }
        )?;
        for column in &table.columns {
            wprintln!(
                writer,
                "      column {:>5}  {:<32} {} (codepage {})",
                column.identifier,
                column.name,
                column.column_type,
                column.codepage
            )?;
        }
        for index in &table.indexes {
            wprintln!(
                writer,
                "      index  {:>5}  {:<32} root page {}",
                index.identifier,
                index.name,
                index.root_page
            )?;
        }
    }

    report_warnings(&db, writer)
}

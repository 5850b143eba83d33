//! The `esedb pages` subcommand: page structure listing.

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{open_db, wprintln};
use crate::ese::constants::*;
use crate::ese::page::Page;
use crate::EseError;

/// Options for the `esedb pages` subcommand.
pub struct PagesOptions {
    /// Path to the database file.
    pub file: String,
    /// Display a specific page number.
    pub page: Option<u32>,
    /// Include empty pages in the listing.
    pub show_empty: bool,
    /// Emit output as JSON.
    pub json: bool,
}

#[derive(Serialize)]
struct PageReport {
    page_number: u32,
    father_data_page: u32,
    prev_page: u32,
    next_page: u32,
    flags: String,
    tag_count: usize,
    available_size: u16,
    checksum_valid: bool,
}

fn flag_names(flags: u32) -> String {
    let mut names = Vec::new();
    for (bit, name) in [
        (PAGE_FLAG_ROOT, "root"),
        (PAGE_FLAG_LEAF, "leaf"),
        (PAGE_FLAG_PARENT, "branch"),
        (PAGE_FLAG_EMPTY, "empty"),
        (PAGE_FLAG_SPACE_TREE, "space"),
        (PAGE_FLAG_INDEX, "index"),
        (PAGE_FLAG_LONG_VALUE, "long-value"),
        (PAGE_FLAG_NON_UNIQUE_KEYS, "non-unique"),
        (PAGE_FLAG_NEW_RECORD_FORMAT, "new-record"),
        (PAGE_FLAG_NEW_CHECKSUM_FORMAT, "new-checksum"),
        (PAGE_FLAG_SCRUBBED, "scrubbed"),
    ] {
        if flags & bit != 0 {
            names.push(name);
        }
    }
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(",")
    }
}

fn report(page: &Page) -> PageReport {
    PageReport {
        page_number: page.number,
        father_data_page: page.header.father_data_page,
        prev_page: page.header.prev_page,
        next_page: page.header.next_page,
        flags: flag_names(page.header.flags),
        tag_count: page.tag_count(),
        available_size: page.header.available_size,
        checksum_valid: page.checksum_valid,
    }
}

pub fn execute(opts: &PagesOptions, writer: &mut dyn Write) -> Result<(), EseError> {
    let db = open_db(&opts.file)?;

    let range: Vec<u32> = match opts.page {
        Some(page) => vec![page],
        None => (1..=db.page_count()).collect(),
    };

    let mut reports = Vec::new();
    for page_number in range {
        match db.page(page_number) {
            Ok(page) => {
                if !opts.show_empty && page.header.is_empty() && opts.page.is_none() {
                    continue;
                }
                reports.push(report(&page));
            }
            Err(error) => {
                if opts.page.is_some() {
                    return Err(error);
                }
                wprintln!(writer, "page {:>8}  {}", page_number, "unreadable".red())?;
            }
        }
    }

    if opts.json {
        let rendered = serde_json::to_string_pretty(&reports)
            .map_err(|e| EseError::Io(e.to_string()))?;
        wprintln!(writer, "{}", rendered)?;
        return Ok(());
    }

    wprintln!(
        writer,
        "{:>8}  {:>8}  {:>8}  {:>8}  {:>5}  {:>6}  {}",
        "page", "fdp", "prev", "next", "tags", "chksum", "flags"
    )?;
    for report in &reports {
        wprintln!(
            writer,
            "{:>8}  {:>8}  {:>8}  {:>8}  {:>5}  {:>6}  {}",
            report.page_number,
            report.father_data_page,
            report.prev_page,
            report.next_page,
            report.tag_count,
            if report.checksum_valid {
                "ok".green().to_string()
            } else {
                "BAD".red().to_string()
            },
            report.flags
        )?;
    }

    Ok(())
}

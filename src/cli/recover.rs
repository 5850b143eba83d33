//! The `esedb recover` subcommand: orphaned-record scan.
//!
//! Walks every tree the catalog can reach and collects the page numbers
//! they own, then sweeps the whole page array for leaf pages outside that
//! set. Orphaned leaves usually belong to dropped tables or to trees cut
//! off by corruption; their value slots are counted and, when a schema is
//! supplied with `-T`, decoded as records of that table.

use std::collections::HashSet;
use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{create_progress_bar, open_db, report_warnings, wprintln};
use crate::ese::database::EseDb;
use crate::ese::record::{RecordDecoder, Value};
use crate::ese::tree::{self, PageReader};
use crate::EseError;

/// Options for the `esedb recover` subcommand.
pub struct RecoverOptions {
    /// Path to the database file.
    pub file: String,
    /// Decode orphaned records against this table's schema.
    pub table: Option<String>,
    /// Show per-page detail.
    pub verbose: bool,
    /// Emit output as JSON.
    pub json: bool,
}

#[derive(Serialize)]
struct RecoverReport {
    file: String,
    total_pages: u32,
    reachable_pages: usize,
    orphaned_leaf_pages: Vec<OrphanedPage>,
    recovered_records: u64,
}

#[derive(Serialize)]
struct OrphanedPage {
    page_number: u32,
    father_data_page: u32,
    value_slots: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    decoded: Vec<String>,
}

/// Collect every page reachable from the catalog's trees.
fn reachable_pages(db: &EseDb) -> Result<HashSet<u32>, EseError> {
    let mut reachable: HashSet<u32> = HashSet::new();
    reachable.insert(crate::ese::constants::PAGE_NUMBER_CATALOG);
    collect_tree(db, crate::ese::constants::PAGE_NUMBER_CATALOG, &mut reachable);

    let catalog = db.catalog()?;
    for table in &catalog.tables {
        collect_tree(db, table.root_page, &mut reachable);
        for index in &table.indexes {
            collect_tree(db, index.root_page, &mut reachable);
        }
        if let Some(root) = table.long_value_root {
            collect_tree(db, root, &mut reachable);
        }
    }
    Ok(reachable)
}

/// Walk one tree, marking every branch and leaf page it owns. Corruption is
/// tolerated: whatever was reached stays marked.
fn collect_tree(db: &EseDb, root: u32, reachable: &mut HashSet<u32>) {
    if tree::is_sentinel_page(root) || !reachable.insert(root) {
        return;
    }
    let mut stack = vec![root];
    let mut steps = 0u32;
    while let Some(page_number) = stack.pop() {
        if steps > db.total_pages() {
            break;
        }
        steps += 1;

        let Ok(page) = db.page(page_number) else {
            continue;
        };
        reachable.insert(page_number);
        // Space trees hang off the root header slot.
        if page.header.is_root() {
            if let Ok(Some(header)) = tree::root_header(db, page_number) {
                if !tree::is_sentinel_page(header.space_tree_page)
                    && reachable.insert(header.space_tree_page)
                {
                    stack.push(header.space_tree_page);
                }
            }
        }
        if page.header.is_branch() {
            if let Ok(entries) = tree::branch_entries(&page) {
                for entry in entries {
                    if !tree::is_sentinel_page(entry.child_page)
                        && reachable.insert(entry.child_page)
                    {
                        stack.push(entry.child_page);
                    }
                }
            }
        }
        if page.header.is_leaf() && page.header.has_next() && reachable.insert(page.header.next_page)
        {
            stack.push(page.header.next_page);
        }
    }
}

pub fn execute(opts: &RecoverOptions, writer: &mut dyn Write) -> Result<(), EseError> {
    let db = open_db(&opts.file)?;
    let reachable = reachable_pages(&db)?;

    let schema = match &opts.table {
        Some(name) => {
            let catalog = db.catalog()?;
            Some(
                catalog
                    .tables
                    .iter()
                    .find(|t| &t.name == name)
                    .cloned()
                    .ok_or_else(|| EseError::Bounds(format!("No table named {}", name)))?,
            )
        }
        None => None,
    };

    let pb = create_progress_bar(db.page_count() as u64, "pages");
    let mut orphaned = Vec::new();
    let mut recovered = 0u64;

    for page_number in 1..=db.page_count() {
        pb.inc(1);
        db.check_abort()?;
        if reachable.contains(&page_number) {
            continue;
        }
        let Ok(page) = db.page(page_number) else {
            continue;
        };
        if !page.header.is_leaf() || page.header.is_space_tree() || page.header.is_empty() {
            continue;
        }

        let mut decoded = Vec::new();
        let value_slots = page.tag_count().saturating_sub(1);
        if let Some(table) = &schema {
            let decoder = RecordDecoder::new(
                &table.columns,
                db.new_tagged_format(),
                db.default_datetime(),
            );
            if let Ok(entries) = tree::leaf_entries(&page) {
                for entry in entries {
                    let Ok(record) = decoder.decode(&entry.data) else {
                        continue;
                    };
                    recovered += 1;
                    if opts.verbose {
                        let mut fields = Vec::new();
                        for (index, column) in table.columns.iter().enumerate() {
                            if let Ok(Some(raw)) = record.raw(index) {
                                match decoder.typed_value(column, raw) {
                                    Ok(Value::Null) => {}
                                    Ok(value) => {
                                        fields.push(format!("{}={:?}", column.name, value))
                                    }
                                    Err(_) => fields.push(format!("{}=?", column.name)),
                                }
                            }
                        }
                        decoded.push(fields.join(" "));
                    }
                }
            }
        } else {
            recovered += value_slots as u64;
        }

        orphaned.push(OrphanedPage {
            page_number,
            father_data_page: page.header.father_data_page,
            value_slots,
            decoded,
        });
    }
    pb.finish_and_clear();

    if opts.json {
        let report = RecoverReport {
            file: opts.file.clone(),
            total_pages: db.page_count(),
            reachable_pages: reachable.len(),
            orphaned_leaf_pages: orphaned,
            recovered_records: recovered,
        };
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| EseError::Io(e.to_string()))?;
        wprintln!(writer, "{}", rendered)?;
        return Ok(());
    }

    wprintln!(writer, "{}", "Recovery scan".bold())?;
    wprintln!(writer, "  Pages:           {}", db.page_count())?;
    wprintln!(writer, "  Reachable:       {}", reachable.len())?;
    wprintln!(writer, "  Orphaned leaves: {}", orphaned.len())?;
    wprintln!(writer, "  Records found:   {}", recovered)?;
    for page in &orphaned {
        wprintln!(
            writer,
            "  page {:>8}  fdp {:>8}  {} value slot(s)",
            page.page_number,
            page.father_data_page,
            page.value_slots
        )?;
        for line in &page.decoded {
            wprintln!(writer, "      {}", line)?;
        }
    }

    report_warnings(&db, writer)
}

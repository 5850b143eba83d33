//! Tests for the CLI subcommand execute functions.

#![cfg(feature = "cli")]

mod common;

use common::*;

use ese::cli::app::ExportMode;
use ese::cli::{dump, export, info, pages, recover};
use ese::ese::constants::*;
use ese::EseError;

/// A compact database with one `People` table and two records.
fn build_db() -> EdbBuilder {
    let mut builder = EdbBuilder::new();
    install_catalog(
        &mut builder,
        &[
            definition_record(10, CATALOG_TYPE_TABLE, 10, 10, 0, 0, "People"),
            definition_record(10, CATALOG_TYPE_COLUMN, 1, 4, 4, 0, "Id"),
            definition_record(10, CATALOG_TYPE_COLUMN, 128, 10, 0, 1252, "Name"),
        ],
    );

    let r1 = RecordBuilder::new()
        .fixed(1, &1i32.to_le_bytes())
        .variable(128, Some(b"alice"))
        .build();
    let r2 = RecordBuilder::new()
        .fixed(1, &2i32.to_le_bytes())
        .variable(128, Some(b"bob"))
        .build();
    builder.page(
        10,
        PAGE_FLAG_ROOT | PAGE_FLAG_LEAF,
        10,
        0,
        0,
        &[
            (root_header_value(0), 0),
            (leaf_value(b"k01", &r1), 0),
            (leaf_value(b"k02", &r2), 0),
        ],
    );
    builder
}

#[test]
fn test_export_writes_tsv_per_table() {
    let tmp = build_db().write_temp();
    let out_dir = tempfile::tempdir().unwrap();
    let target = out_dir.path().join("people-db");

    let mut output = Vec::new();
    export::execute(
        &export::ExportOptions {
            file: tmp.path().display().to_string(),
            target: Some(target.display().to_string()),
            table: None,
            mode: ExportMode::Tables,
            logfile: None,
        },
        &mut output,
    )
    .unwrap();

    let table_file = out_dir.path().join("people-db.export").join("People");
    let contents = std::fs::read_to_string(&table_file).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "Id\tName");
    assert_eq!(lines[1], "1\talice");
    assert_eq!(lines[2], "2\tbob");

    let rendered = String::from_utf8(output).unwrap();
    assert!(rendered.contains("People: 2 records"));
}

#[test]
fn test_export_single_table_filter() {
    let tmp = build_db().write_temp();
    let out_dir = tempfile::tempdir().unwrap();
    let target = out_dir.path().join("one");

    let mut output = Vec::new();
    export::execute(
        &export::ExportOptions {
            file: tmp.path().display().to_string(),
            target: Some(target.display().to_string()),
            table: Some("People".to_string()),
            mode: ExportMode::All,
            logfile: None,
        },
        &mut output,
    )
    .unwrap();
    assert!(out_dir.path().join("one.export").join("People").exists());

    let result = export::execute(
        &export::ExportOptions {
            file: tmp.path().display().to_string(),
            target: Some(target.display().to_string()),
            table: Some("Missing".to_string()),
            mode: ExportMode::All,
            logfile: None,
        },
        &mut Vec::new(),
    );
    assert!(matches!(result, Err(EseError::Bounds(_))));
}

#[test]
fn test_info_plain_and_json() {
    let tmp = build_db().write_temp();

    let mut output = Vec::new();
    info::execute(
        &info::InfoOptions {
            file: tmp.path().display().to_string(),
            verbose: true,
            json: false,
        },
        &mut output,
    )
    .unwrap();
    let rendered = String::from_utf8(output).unwrap();
    assert!(rendered.contains("People"));
    assert!(rendered.contains("JET_coltypText"));

    let mut output = Vec::new();
    info::execute(
        &info::InfoOptions {
            file: tmp.path().display().to_string(),
            verbose: false,
            json: true,
        },
        &mut output,
    )
    .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed["page_size"], 8192);
    assert_eq!(parsed["tables"][0]["name"], "People");
}

#[test]
fn test_pages_listing_json() {
    let tmp = build_db().write_temp();

    let mut output = Vec::new();
    pages::execute(
        &pages::PagesOptions {
            file: tmp.path().display().to_string(),
            page: None,
            show_empty: false,
            json: true,
        },
        &mut output,
    )
    .unwrap();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let reports = parsed.as_array().unwrap();
    assert!(reports
        .iter()
        .any(|r| r["page_number"] == 4 && r["flags"].as_str().unwrap().contains("leaf")));
}

#[test]
fn test_dump_page_hex() {
    let tmp = build_db().write_temp();

    let mut output = Vec::new();
    dump::execute(
        &dump::DumpOptions {
            file: tmp.path().display().to_string(),
            page: Some(4),
            offset: None,
            length: Some(64),
        },
        &mut output,
    )
    .unwrap();
    let rendered = String::from_utf8(output).unwrap();
    assert!(rendered.contains('|'));
    assert_eq!(rendered.lines().count(), 4);
}

#[test]
fn test_recover_finds_orphaned_leaf() {
    let mut builder = build_db();
    // A leaf page no catalog tree references.
    let stray = RecordBuilder::new().fixed(1, &9i32.to_le_bytes()).build();
    builder.page(
        20,
        PAGE_FLAG_LEAF,
        99,
        0,
        0,
        &[(b"pk".to_vec(), 0), (leaf_value(b"s1", &stray), 0)],
    );
    let tmp = builder.write_temp();

    let mut output = Vec::new();
    recover::execute(
        &recover::RecoverOptions {
            file: tmp.path().display().to_string(),
            table: None,
            verbose: false,
            json: true,
        },
        &mut output,
    )
    .unwrap();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let orphans = parsed["orphaned_leaf_pages"].as_array().unwrap();
    assert!(orphans.iter().any(|o| o["page_number"] == 20));
    assert!(parsed["recovered_records"].as_u64().unwrap() >= 1);
}

#[test]
fn test_recover_with_schema_decodes_records() {
    let mut builder = build_db();
    let stray = RecordBuilder::new()
        .fixed(1, &9i32.to_le_bytes())
        .variable(128, Some(b"ghost"))
        .build();
    builder.page(
        20,
        PAGE_FLAG_LEAF,
        99,
        0,
        0,
        &[(b"pk".to_vec(), 0), (leaf_value(b"s1", &stray), 0)],
    );
    let tmp = builder.write_temp();

    let mut output = Vec::new();
    recover::execute(
        &recover::RecoverOptions {
            file: tmp.path().display().to_string(),
            table: Some("People".to_string()),
            verbose: true,
            json: false,
        },
        &mut output,
    )
    .unwrap();
    let rendered = String::from_utf8(output).unwrap();
    assert!(rendered.contains("Records found:   1"));
    assert!(rendered.contains("ghost"));
}

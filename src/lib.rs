//! Extensible Storage Engine (ESE) database parsing toolkit.
//!
//! The `esedb-utils` crate (library name `ese`) provides Rust types and
//! functions for opening and reading ESE database files, the format behind
//! Active Directory's `ntds.dit`, Windows Search's `Windows.edb`, the SRUM
//! and WebCache stores, and the Exchange message database. Access is strictly
//! read-only.
//!
//! # CLI Reference
//!
//! Install the `esedb` binary and use its subcommands to inspect ESE files
//! from the command line.
//!
//! ## Subcommands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | [`esedb info`](cli::app::Commands::Info) | Print the catalog: tables, columns, indexes |
//! | [`esedb export`](cli::app::Commands::Export) | Export every table (or one) to tab-separated files |
//! | [`esedb pages`](cli::app::Commands::Pages) | One-line-per-page structure listing |
//! | [`esedb dump`](cli::app::Commands::Dump) | Hex dump of raw page bytes |
//! | [`esedb recover`](cli::app::Commands::Recover) | Scan pages unreachable from the catalog for records |
//!
//! Most subcommands accept `--json` for machine-readable output; all accept
//! `--output <file>` to redirect and `--color <auto|always|never>`.
//!
//! # Library API
//!
//! Add `ese` as a dependency to use the parsing library directly:
//!
//! ```toml
//! [dependencies]
//! ese = { package = "esedb-utils", version = "0.3", default-features = false }
//! ```
//!
//! ## Quick example
//!
//! ```no_run
//! use ese::ese::database::EseDb;
//!
//! let db = EseDb::open("Windows.edb").unwrap();
//! println!("page size: {}", db.page_size());
//!
//! for table in db.tables().unwrap() {
//!     println!("table {}", table.name());
//!     for record in table.records() {
//!         let record = record.unwrap();
//!         let value = record.value(0).unwrap();
//!         println!("  {:?}", value);
//!     }
//! }
//! ```
//!
//! ## Key entry points
//!
//! | Type / Function | Purpose |
//! |-----------------|---------|
//! | [`EseDb`](ese::database::EseDb) | Open a database, enumerate tables, read pages |
//! | [`Table`](ese::table::Table) | Columns, indexes, lazy record iteration |
//! | [`Record`](ese::table::Record) | Typed column values, long/multi value handles |
//! | [`LongValue`](ese::long_value::LongValue) | Streamed access to out-of-row values |
//! | [`MultiValue`](ese::multi_value::MultiValue) | Ordered sub-values of one column |
//! | [`decompress_7bit`](ese::compression::decompress_7bit) | 7-bit packed text decoder |
//! | [`decompress_lzxpress`](ese::compression::decompress_lzxpress) | LZXPRESS decoder |
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ese::database`] | File open, header validation, page cache, handles |
//! | [`ese::page`] | Page header, tag array, value slots |
//! | [`ese::tree`] | B-tree traversal and key search |
//! | [`ese::catalog`] | Catalog interpretation (tables, columns, indexes) |
//! | [`ese::record`] | Row decoding: fixed, variable, and tagged columns |
//! | [`ese::long_value`] | Long-value segment reassembly |
//! | [`ese::multi_value`] | Multi-value payload splitting |
//! | [`ese::compression`] | 7-bit packed text and LZXPRESS decompression |
//! | [`ese::checksum`] | XOR and ECC page checksum validation |
//! | [`ese::constants`] | On-disk structure constants |

#[cfg(feature = "cli")]
pub mod cli;
pub mod ese;
pub mod util;

use thiserror::Error;

/// Errors returned by `ese` operations.
#[derive(Error, Debug)]
pub enum EseError {
    /// An I/O error occurred (file open, read, or seek failure, or short read).
    #[error("I/O error: {0}")]
    Io(String),

    /// On-disk bytes violate a format invariant (bad magic, impossible offset,
    /// out-of-order tags).
    #[error("Format error: {0}")]
    Format(String),

    /// A page checksum mismatch. Only returned when strict checksum mode is
    /// enabled; otherwise recorded as a warning.
    #[error("Checksum mismatch on page {page_number}: stored {stored:#x}, calculated {calculated:#x}")]
    Checksum {
        page_number: u32,
        stored: u64,
        calculated: u64,
    },

    /// A known but unimplemented construct (format revision, column type).
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Caller asked for an index, table, or column that does not exist.
    #[error("Out of bounds: {0}")]
    Bounds(String),

    /// Caller asked for typed access that does not match the stored type.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A 7-bit or LZXPRESS stream violated an invariant.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Cooperative cancellation was signalled.
    #[error("Operation aborted")]
    Aborted,
}

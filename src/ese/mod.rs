//! ESE binary format parsing.
//!
//! This module contains the storage engine reader: the paged file I/O, page
//! and checksum codecs, B-tree traversal, catalog interpretation, record
//! decoding (fixed, variable, tagged, multi-value, and compressed columns),
//! and long-value reassembly.
//!
//! Start with [`database::EseDb`] to open a file, then walk
//! [`table::Table`] handles from [`database::EseDb::tables`].

pub mod cache;
pub mod catalog;
pub mod checksum;
pub mod column_types;
pub mod compression;
pub mod constants;
pub mod database;
pub mod header;
pub mod io;
pub mod long_value;
pub mod multi_value;
pub mod page;
pub mod record;
pub mod table;
pub mod tree;

//! Synthetic database builder shared by the integration tests.
//!
//! Assembles byte-exact ESE database images, with file header, shadow copy, and
//! small-format pages carrying valid XOR checksums, then hands them over as
//! temp files for the reader to open.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::NamedTempFile;

use ese::ese::checksum::{calculate_header_checksum, calculate_page_xor};
use ese::ese::constants::*;

/// Default page size used by the suites (large enough for 4 KiB long-value
/// segments, still the small tag format).
pub const PAGE_SIZE: usize = 8192;

/// Builds a database image page by page.
pub struct EdbBuilder {
    page_size: usize,
    revision: u32,
    pages: BTreeMap<u32, Vec<u8>>,
}

impl EdbBuilder {
    pub fn new() -> Self {
        Self::with_page_size(PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        EdbBuilder {
            page_size,
            revision: 0x0b,
            pages: BTreeMap::new(),
        }
    }

    /// Add a page assembled from value slots (tag 0 first).
    pub fn page(
        &mut self,
        number: u32,
        flags: u32,
        fdp: u32,
        prev: u32,
        next: u32,
        values: &[(Vec<u8>, u8)],
    ) {
        let mut page = vec![0u8; self.page_size];
        LittleEndian::write_u32(&mut page[PAGE_HDR_CHECKSUM + 4..], number);
        LittleEndian::write_u64(&mut page[PAGE_HDR_DATABASE_TIME..], 0x2000 + number as u64);
        LittleEndian::write_u32(&mut page[PAGE_HDR_PREV_PAGE..], prev);
        LittleEndian::write_u32(&mut page[PAGE_HDR_NEXT_PAGE..], next);
        LittleEndian::write_u32(&mut page[PAGE_HDR_FDP..], fdp);
        LittleEndian::write_u16(&mut page[PAGE_HDR_TAG_COUNT..], values.len() as u16);
        LittleEndian::write_u32(&mut page[PAGE_HDR_FLAGS..], flags);

        let mut body_offset = 0usize;
        for (index, (value, tag_flags)) in values.iter().enumerate() {
            let start = SIZE_PAGE_HEADER + body_offset;
            page[start..start + value.len()].copy_from_slice(value);

            let entry = self.page_size - (index + 1) * SIZE_PAGE_TAG;
            LittleEndian::write_u16(&mut page[entry..], value.len() as u16);
            LittleEndian::write_u16(
                &mut page[entry + 2..],
                body_offset as u16 | ((*tag_flags as u16) << 13),
            );
            body_offset += value.len();
        }

        let checksum = calculate_page_xor(&page, number);
        LittleEndian::write_u32(&mut page[PAGE_HDR_CHECKSUM..], checksum);
        self.pages.insert(number, page);
    }

    /// Raw access for corruption tests.
    pub fn page_mut(&mut self, number: u32) -> &mut Vec<u8> {
        self.pages.get_mut(&number).expect("page was added")
    }

    fn file_header(&self) -> Vec<u8> {
        let mut header = vec![0u8; SIZE_FILE_HEADER];
        LittleEndian::write_u32(&mut header[FILE_HDR_SIGNATURE..], FILE_SIGNATURE);
        LittleEndian::write_u32(&mut header[FILE_HDR_FORMAT_VERSION..], FORMAT_VERSION);
        LittleEndian::write_u32(&mut header[FILE_HDR_FILE_TYPE..], 0);
        LittleEndian::write_u64(&mut header[FILE_HDR_DATABASE_TIME..], 0x1234);
        LittleEndian::write_u32(&mut header[FILE_HDR_FORMAT_REVISION..], self.revision);
        LittleEndian::write_u32(&mut header[FILE_HDR_PAGE_SIZE..], self.page_size as u32);
        let checksum = calculate_header_checksum(&header);
        LittleEndian::write_u32(&mut header[FILE_HDR_CHECKSUM..], checksum);
        header
    }

    /// Assemble the full image: header, shadow, then the page array with
    /// zero fill for unreferenced page numbers.
    pub fn build(&self) -> Vec<u8> {
        let mut image = Vec::new();
        let mut header_page = self.file_header();
        header_page.resize(self.page_size, 0);
        image.extend_from_slice(&header_page);
        image.extend_from_slice(&header_page);

        let last = self.pages.keys().max().copied().unwrap_or(0);
        for number in 1..=last {
            match self.pages.get(&number) {
                Some(page) => image.extend_from_slice(page),
                None => image.extend_from_slice(&vec![0u8; self.page_size]),
            }
        }
        image
    }

    pub fn write_temp(&self) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().expect("create temp file");
        tmp.write_all(&self.build()).expect("write image");
        tmp.flush().expect("flush image");
        tmp
    }
}

// ── Entry encoding ──────────────────────────────────────────────────

/// Leaf entry: local key size, key, payload.
pub fn leaf_value(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut value = Vec::new();
    value.extend_from_slice(&(key.len() as u16).to_le_bytes());
    value.extend_from_slice(key);
    value.extend_from_slice(data);
    value
}

/// Branch entry: local key size, key, child page number.
pub fn branch_value(key: &[u8], child: u32) -> Vec<u8> {
    let mut value = Vec::new();
    value.extend_from_slice(&(key.len() as u16).to_le_bytes());
    value.extend_from_slice(key);
    value.extend_from_slice(&child.to_le_bytes());
    value
}

/// 16-byte root header slot.
pub fn root_header_value(space_tree: u32) -> Vec<u8> {
    let mut value = vec![0u8; 16];
    LittleEndian::write_u32(&mut value[0..], 1);
    LittleEndian::write_u32(&mut value[12..], space_tree);
    value
}

// ── Record encoding ─────────────────────────────────────────────────

/// Builds record bytes in the on-disk data-definition layout.
pub struct RecordBuilder {
    fixed: Vec<(u32, Vec<u8>)>,
    variable: Vec<(u32, Option<Vec<u8>>)>,
    tagged: Vec<(u32, u8, Vec<u8>)>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        RecordBuilder {
            fixed: Vec::new(),
            variable: Vec::new(),
            tagged: Vec::new(),
        }
    }

    pub fn fixed(mut self, id: u32, data: &[u8]) -> Self {
        self.fixed.push((id, data.to_vec()));
        self
    }

    pub fn variable(mut self, id: u32, data: Option<&[u8]>) -> Self {
        self.variable.push((id, data.map(|d| d.to_vec())));
        self
    }

    pub fn tagged(mut self, id: u32, flags: u8, data: &[u8]) -> Self {
        self.tagged.push((id, flags, data.to_vec()));
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.fixed.sort_by_key(|(id, _)| *id);
        self.variable.sort_by_key(|(id, _)| *id);
        self.tagged.sort_by_key(|(id, _, _)| *id);

        let last_fixed = self.fixed.last().map(|(id, _)| *id).unwrap_or(0);
        let last_variable = self
            .variable
            .last()
            .map(|(id, _)| *id)
            .unwrap_or(FIRST_VARIABLE_COLUMN_ID - 1);

        let mut record = vec![last_fixed as u8, last_variable as u8, 0, 0];
        for (_, data) in &self.fixed {
            record.extend_from_slice(data);
        }
        let bitmap_size = (last_fixed as usize + 7) / 8;
        let mut bitmap = vec![0u8; bitmap_size];
        for (id, _) in &self.fixed {
            let bit = *id as usize - 1;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
        record.extend_from_slice(&bitmap);

        let variable_offset = record.len();
        LittleEndian::write_u16(&mut record[2..], variable_offset as u16);

        let count = (last_variable - (FIRST_VARIABLE_COLUMN_ID - 1)) as usize;
        let mut offsets = vec![0u16; count];
        let mut payload: Vec<u8> = Vec::new();
        let mut end = 0u16;
        for (slot, offset) in offsets.iter_mut().enumerate() {
            let id = FIRST_VARIABLE_COLUMN_ID + slot as u32;
            match self.variable.iter().find(|(vid, _)| *vid == id) {
                Some((_, Some(data))) => {
                    payload.extend_from_slice(data);
                    end += data.len() as u16;
                    *offset = end;
                }
                _ => *offset = end | VARIABLE_OFFSET_EMPTY,
            }
        }
        for offset in &offsets {
            record.extend_from_slice(&offset.to_le_bytes());
        }
        record.extend_from_slice(&payload);

        if !self.tagged.is_empty() {
            let index_size = self.tagged.len() * 4;
            let mut entry_words = Vec::new();
            let mut payload: Vec<u8> = Vec::new();
            for (_, flags, data) in &self.tagged {
                let offset = (index_size + payload.len()) as u16;
                if *flags != 0 {
                    entry_words.push(offset | TAGGED_OFFSET_HAS_FLAGS);
                    payload.push(*flags);
                } else {
                    entry_words.push(offset);
                }
                payload.extend_from_slice(data);
            }
            for ((id, _, _), word) in self.tagged.iter().zip(&entry_words) {
                record.extend_from_slice(&(*id as u16).to_le_bytes());
                record.extend_from_slice(&word.to_le_bytes());
            }
            record.extend_from_slice(&payload);
        }

        record
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Catalog encoding ────────────────────────────────────────────────

/// One catalog definition in record form.
#[allow(clippy::too_many_arguments)]
pub fn definition_record(
    father_data_page: u32,
    definition_type: u16,
    identifier: u32,
    coltyp_or_fdp: u32,
    space_usage: u32,
    codepage: u32,
    name: &str,
) -> Vec<u8> {
    RecordBuilder::new()
        .fixed(1, &(father_data_page as i32).to_le_bytes())
        .fixed(2, &(definition_type as i16).to_le_bytes())
        .fixed(3, &(identifier as i32).to_le_bytes())
        .fixed(4, &(coltyp_or_fdp as i32).to_le_bytes())
        .fixed(5, &(space_usage as i32).to_le_bytes())
        .fixed(6, &0i32.to_le_bytes())
        .fixed(7, &(codepage as i32).to_le_bytes())
        .variable(128, Some(name.as_bytes()))
        .build()
}

/// Install a single-page catalog at page 4.
pub fn install_catalog(builder: &mut EdbBuilder, records: &[Vec<u8>]) {
    let mut values: Vec<(Vec<u8>, u8)> = vec![(root_header_value(0), 0)];
    for (index, record) in records.iter().enumerate() {
        let key = format!("c{:04}", index);
        values.push((leaf_value(key.as_bytes(), record), 0));
    }
    builder.page(
        PAGE_NUMBER_CATALOG,
        PAGE_FLAG_ROOT | PAGE_FLAG_LEAF,
        PAGE_NUMBER_CATALOG,
        0,
        0,
        &values,
    );
}

// ── Long-value key encoding ─────────────────────────────────────────

pub fn lv_size_key(id: u32) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub fn lv_segment_key(id: u32, offset: u32) -> Vec<u8> {
    let mut key = id.to_be_bytes().to_vec();
    key.extend_from_slice(&offset.to_be_bytes());
    key
}

pub fn lv_size_record(flags: u32, size: u32) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    LittleEndian::write_u32(&mut data[0..], flags);
    LittleEndian::write_u32(&mut data[4..], size);
    data
}

/// UTF-16LE bytes of a string.
pub fn utf16(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

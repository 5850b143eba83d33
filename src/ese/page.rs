//! ESE page parsing: header, tag array, and value slots.
//!
//! Every page starts with a 40-byte header (80 bytes when the page carries
//! the new checksum format) and ends with the tag array: 4 bytes per tag,
//! stored in reverse order so tag 0 occupies the last 4 bytes of the page.
//! Each tag addresses one value slot in the page body between header and
//! tag array.
//!
//! Two tag encodings exist. On small pages (≤ 8 KiB) the offset and size
//! are 13-bit and the top three bits of the offset word hold the tag flags.
//! On large pages the offset and size are 15-bit and the flags migrate into
//! the top three bits of the first 16-bit word of the value itself, which
//! must be masked back out before the value is interpreted.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use std::borrow::Cow;

use crate::ese::checksum::{validate_page_blocks, validate_page_xor};
use crate::ese::constants::*;
use crate::ese::header::FileHeader;
use crate::EseError;

/// Checksum words of a page, by header generation.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum PageChecksum {
    /// 40-byte header: XOR checksum plus stored page number.
    Legacy { xor: u32, page_number: u32 },
    /// 80-byte header: four 64-bit sub-block checksums (the last three live
    /// in the extended header).
    Blocks { checksums: [u64; 4] },
}

/// Parsed page header.
#[derive(Debug, Clone, Serialize)]
pub struct PageHeader {
    /// Checksum field(s), shape depending on format generation.
    pub checksum: PageChecksum,
    /// Database time of the last modification.
    pub database_time: u64,
    /// Previous sibling page number (0 if none).
    pub prev_page: u32,
    /// Next sibling page number (0 if none).
    pub next_page: u32,
    /// Father data page object identifier of the owning tree.
    pub father_data_page: u32,
    /// Free bytes in the page body.
    pub available_size: u16,
    /// Free bytes pending commit.
    pub uncommitted_size: u16,
    /// Body offset of the first free byte.
    pub available_offset: u16,
    /// Number of tags in use.
    pub tag_count: u16,
    /// Page flags.
    pub flags: u32,
    /// 64-bit page number from the extended header, when present.
    pub extended_page_number: Option<u64>,
}

impl PageHeader {
    pub fn is_root(&self) -> bool {
        self.flags & PAGE_FLAG_ROOT != 0
    }

    pub fn is_leaf(&self) -> bool {
        self.flags & PAGE_FLAG_LEAF != 0
    }

    pub fn is_branch(&self) -> bool {
        self.flags & PAGE_FLAG_PARENT != 0
    }

    pub fn is_empty(&self) -> bool {
        self.flags & PAGE_FLAG_EMPTY != 0
    }

    pub fn is_space_tree(&self) -> bool {
        self.flags & PAGE_FLAG_SPACE_TREE != 0
    }

    pub fn is_index(&self) -> bool {
        self.flags & PAGE_FLAG_INDEX != 0
    }

    pub fn is_long_value(&self) -> bool {
        self.flags & PAGE_FLAG_LONG_VALUE != 0
    }

    pub fn is_scrubbed(&self) -> bool {
        self.flags & PAGE_FLAG_SCRUBBED != 0
    }

    /// Size of this header on disk (40 or 80 bytes).
    pub fn size_bytes(&self) -> usize {
        if self.flags & PAGE_FLAG_NEW_CHECKSUM_FORMAT != 0 {
            SIZE_PAGE_HEADER_EXTENDED
        } else {
            SIZE_PAGE_HEADER
        }
    }

    pub fn has_prev(&self) -> bool {
        self.prev_page != 0
    }

    pub fn has_next(&self) -> bool {
        self.next_page != 0
    }
}

/// One entry of the tag array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageTag {
    /// Body-relative offset of the value.
    pub offset: u16,
    /// Value size in bytes.
    pub size: u16,
    /// Tag flags (version / deleted / common-key).
    pub flags: u8,
}

impl PageTag {
    pub fn is_deleted(&self) -> bool {
        self.flags & TAG_FLAG_DELETED != 0
    }

    pub fn has_common_key(&self) -> bool {
        self.flags & TAG_FLAG_COMMON_KEY != 0
    }
}

/// A decoded page: header, raw bytes, and the parsed tag array.
#[derive(Debug, Clone)]
pub struct Page {
    /// Page number this page was read as.
    pub number: u32,
    /// Parsed header.
    pub header: PageHeader,
    /// Parsed tag array, in tag order.
    pub tags: Vec<PageTag>,
    /// False when a checksum failed; the page is still usable.
    pub checksum_valid: bool,
    data: Vec<u8>,
    large_format: bool,
}

impl Page {
    /// Parse a raw page buffer.
    ///
    /// Checksum mismatches do not fail the parse: the page is returned with
    /// `checksum_valid` cleared so the caller can decide whether to tolerate
    /// it. A header or tag array that cannot be interpreted is fatal for the
    /// page.
    pub fn parse(number: u32, data: Vec<u8>, file_header: &FileHeader) -> Result<Self, EseError> {
        let page_size = file_header.page_size as usize;
        if data.len() != page_size {
            return Err(EseError::Format(format!(
                "Page {}: buffer is {} bytes, page size is {}",
                number,
                data.len(),
                page_size
            )));
        }

        let flags = LittleEndian::read_u32(&data[PAGE_HDR_FLAGS..]);
        let extended = flags & PAGE_FLAG_NEW_CHECKSUM_FORMAT != 0;
        let header_size = if extended {
            SIZE_PAGE_HEADER_EXTENDED
        } else {
            SIZE_PAGE_HEADER
        };
        if page_size < header_size {
            return Err(EseError::Format(format!(
                "Page {}: page size {} smaller than header",
                number, page_size
            )));
        }

        let (checksum, extended_page_number, checksum_valid) = if extended {
            let mut checksums = [0u64; 4];
            checksums[0] = LittleEndian::read_u64(&data[PAGE_HDR_CHECKSUM..]);
            for (i, checksum) in checksums.iter_mut().enumerate().skip(1) {
                let offset = PAGE_HDR_EXT_CHECKSUMS + (i - 1) * 8;
                *checksum = LittleEndian::read_u64(&data[offset..]);
            }
            let results = validate_page_blocks(&data, number);
            let valid = results.iter().all(|r| r.valid);
            let stored_number = LittleEndian::read_u64(&data[PAGE_HDR_EXT_PAGE_NUMBER..]);
            (
                PageChecksum::Blocks { checksums },
                Some(stored_number),
                valid,
            )
        } else {
            let result = validate_page_xor(&data, number);
            (
                PageChecksum::Legacy {
                    xor: LittleEndian::read_u32(&data[PAGE_HDR_CHECKSUM..]),
                    page_number: LittleEndian::read_u32(&data[PAGE_HDR_CHECKSUM + 4..]),
                },
                None,
                result.valid,
            )
        };

        let header = PageHeader {
            checksum,
            database_time: LittleEndian::read_u64(&data[PAGE_HDR_DATABASE_TIME..]),
            prev_page: LittleEndian::read_u32(&data[PAGE_HDR_PREV_PAGE..]),
            next_page: LittleEndian::read_u32(&data[PAGE_HDR_NEXT_PAGE..]),
            father_data_page: LittleEndian::read_u32(&data[PAGE_HDR_FDP..]),
            available_size: LittleEndian::read_u16(&data[PAGE_HDR_AVAILABLE_SIZE..]),
            uncommitted_size: LittleEndian::read_u16(&data[PAGE_HDR_UNCOMMITTED_SIZE..]),
            available_offset: LittleEndian::read_u16(&data[PAGE_HDR_AVAILABLE_OFFSET..]),
            tag_count: LittleEndian::read_u16(&data[PAGE_HDR_TAG_COUNT..]),
            flags,
            extended_page_number,
        };

        let large_format = file_header.page_size > MAX_SIZE_SMALL_PAGE;
        let tags = parse_tags(number, &data, &header, large_format)?;

        Ok(Page {
            number,
            header,
            tags,
            checksum_valid,
            data,
            large_format,
        })
    }

    /// Number of value slots on the page.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// The bytes of one value slot.
    ///
    /// On large-format pages the tag flag bits riding in the first 16-bit
    /// word of the value are masked out of the returned bytes.
    pub fn value(&self, tag_index: usize) -> Result<Cow<'_, [u8]>, EseError> {
        let tag = self.tags.get(tag_index).ok_or_else(|| {
            EseError::Bounds(format!(
                "Page {}: tag {} of {}",
                self.number,
                tag_index,
                self.tags.len()
            ))
        })?;

        let body = self.header.size_bytes();
        let start = body + tag.offset as usize;
        let end = start + tag.size as usize;
        let slice = &self.data[start..end];

        if self.large_format && slice.len() >= 2 {
            let mut owned = slice.to_vec();
            owned[1] &= 0x1f;
            Ok(Cow::Owned(owned))
        } else {
            Ok(Cow::Borrowed(slice))
        }
    }

    /// Raw page bytes.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }
}

/// Decode the tag array at the end of a page.
fn parse_tags(
    number: u32,
    data: &[u8],
    header: &PageHeader,
    large_format: bool,
) -> Result<Vec<PageTag>, EseError> {
    let page_size = data.len();
    let header_size = header.size_bytes();
    let tag_count = header.tag_count as usize;
    let tag_bytes = tag_count * SIZE_PAGE_TAG;
    let body_size = page_size - header_size;

    if tag_bytes > body_size {
        return Err(EseError::Format(format!(
            "Page {}: tag array ({} tags) exceeds page body",
            number, tag_count
        )));
    }

    let body_limit = (body_size - tag_bytes) as u64;
    let value_mask = if large_format {
        TAG_VALUE_MASK_LARGE
    } else {
        TAG_VALUE_MASK_SMALL
    };

    let mut tags = Vec::with_capacity(tag_count);
    for index in 0..tag_count {
        // Tag 0 occupies the final 4 bytes, tag N the 4 bytes before tag N-1.
        let entry = page_size - (index + 1) * SIZE_PAGE_TAG;
        let size_word = LittleEndian::read_u16(&data[entry..]);
        let offset_word = LittleEndian::read_u16(&data[entry + 2..]);

        let offset = offset_word & value_mask;
        let size = size_word & value_mask;
        let flags = if large_format {
            // Flags live in the value data; fetch them if the value is big
            // enough to carry a 16-bit word.
            let start = header_size + offset as usize;
            if size >= 2 && start + 2 <= page_size {
                ((LittleEndian::read_u16(&data[start..]) >> 13) & 0x07) as u8
            } else {
                0
            }
        } else {
            ((offset_word >> 13) & 0x07) as u8
        };

        if offset as u64 + size as u64 > body_limit {
            return Err(EseError::Format(format!(
                "Page {}: tag {} value ({} bytes at offset {}) overlaps the tag array",
                number, index, size, offset
            )));
        }

        tags.push(PageTag {
            offset,
            size,
            flags,
        });
    }

    Ok(tags)
}

/// The distinguished header slot (tag 0) of a tree's root page.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RootPageHeader {
    /// Pages initially allocated to the tree.
    pub initial_page_count: u32,
    /// Father data page number of the parent tree.
    pub parent_fdp: u32,
    /// Extent-allocation policy (0 = single, 1 = multiple).
    pub extent_space: u32,
    /// Root page number of the space tree, 0 if none.
    pub space_tree_page: u32,
}

impl RootPageHeader {
    /// Parse the root header slot. Two layouts exist: a 16-byte form and a
    /// 25-byte form with one leading and two trailing extra fields.
    pub fn parse(data: &[u8]) -> Result<Self, EseError> {
        match data.len() {
            16 => Ok(RootPageHeader {
                initial_page_count: LittleEndian::read_u32(&data[0..]),
                parent_fdp: LittleEndian::read_u32(&data[4..]),
                extent_space: LittleEndian::read_u32(&data[8..]),
                space_tree_page: LittleEndian::read_u32(&data[12..]),
            }),
            25 => Ok(RootPageHeader {
                initial_page_count: LittleEndian::read_u32(&data[0..]),
                parent_fdp: LittleEndian::read_u32(&data[5..]),
                extent_space: LittleEndian::read_u32(&data[9..]),
                space_tree_page: LittleEndian::read_u32(&data[13..]),
            }),
            other => Err(EseError::Format(format!(
                "Root page header slot of {} bytes (expected 16 or 25)",
                other
            ))),
        }
    }
}

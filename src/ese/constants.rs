//! ESE page and file structure constants.
//!
//! Offsets and magic values for the on-disk structures of the Extensible
//! Storage Engine database format: the 668-byte file header, the 40/80-byte
//! page header, the tag array, and the catalog record layout.

// ── Page sizes ──────────────────────────────────────────────────────

/// 2 KiB page size (oldest databases).
pub const SIZE_PAGE_2K: u32 = 2048;
/// 4 KiB page size.
pub const SIZE_PAGE_4K: u32 = 4096;
/// 8 KiB page size (the common legacy size).
pub const SIZE_PAGE_8K: u32 = 8192;
/// 16 KiB page size.
pub const SIZE_PAGE_16K: u32 = 16384;
/// 32 KiB page size.
pub const SIZE_PAGE_32K: u32 = 32768;

/// Largest page size at which the compact page-tag format is used.
/// Above this, tags use 15-bit offsets/sizes and per-value flag bytes.
pub const MAX_SIZE_SMALL_PAGE: u32 = 8192;

/// Page sizes a conforming database may declare.
pub const VALID_PAGE_SIZES: [u32; 5] = [
    SIZE_PAGE_2K,
    SIZE_PAGE_4K,
    SIZE_PAGE_8K,
    SIZE_PAGE_16K,
    SIZE_PAGE_32K,
];

// ── File header (668 bytes, duplicated at offset page_size) ────────

/// Size of the file header structure in bytes.
pub const SIZE_FILE_HEADER: usize = 668;
/// Offset of the header XOR checksum. 4 bytes.
pub const FILE_HDR_CHECKSUM: usize = 0;
/// Offset of the file signature. 4 bytes.
pub const FILE_HDR_SIGNATURE: usize = 4;
/// Offset of the format version word. 4 bytes.
pub const FILE_HDR_FORMAT_VERSION: usize = 8;
/// Offset of the file type word (0 = database, 1 = streaming). 4 bytes.
pub const FILE_HDR_FILE_TYPE: usize = 12;
/// Offset of the database time. 8 bytes.
pub const FILE_HDR_DATABASE_TIME: usize = 16;
/// Offset of the database signature. 28 bytes.
pub const FILE_HDR_DATABASE_SIGNATURE: usize = 24;
/// Offset of the database state. 4 bytes.
pub const FILE_HDR_DATABASE_STATE: usize = 52;
/// Offset of the format revision word. 4 bytes.
pub const FILE_HDR_FORMAT_REVISION: usize = 232;
/// Offset of the page size. 4 bytes.
pub const FILE_HDR_PAGE_SIZE: usize = 236;

/// File signature: `\xef\xcd\xab\x89` read as little-endian u32.
pub const FILE_SIGNATURE: u32 = 0x89ab_cdef;
/// The only supported format version.
pub const FORMAT_VERSION: u32 = 0x620;

/// Format revision that introduced the extended (80-byte) page header and
/// the new tagged-record layout.
pub const FORMAT_REVISION_NEW_RECORD: u32 = 0x11;
/// Format revision that introduced the 64-bit sub-block checksums.
pub const FORMAT_REVISION_NEW_CHECKSUM: u32 = 0x14;

// ── Page header (40 bytes, or 80 with the extended part) ───────────

/// Size of the common page header in bytes.
pub const SIZE_PAGE_HEADER: usize = 40;
/// Size of the extended page header (new checksum format) in bytes.
pub const SIZE_PAGE_HEADER_EXTENDED: usize = 80;
/// Offset of the checksum field (u64: XOR+page number, XOR+ECC, or block
/// checksum depending on revision). 8 bytes.
pub const PAGE_HDR_CHECKSUM: usize = 0;
/// Offset of the database time of last modification. 8 bytes.
pub const PAGE_HDR_DATABASE_TIME: usize = 8;
/// Offset of the previous sibling page number. 4 bytes.
pub const PAGE_HDR_PREV_PAGE: usize = 16;
/// Offset of the next sibling page number. 4 bytes.
pub const PAGE_HDR_NEXT_PAGE: usize = 20;
/// Offset of the father data page object identifier. 4 bytes.
pub const PAGE_HDR_FDP: usize = 24;
/// Offset of the available data size. 2 bytes.
pub const PAGE_HDR_AVAILABLE_SIZE: usize = 28;
/// Offset of the available uncommitted data size. 2 bytes.
pub const PAGE_HDR_UNCOMMITTED_SIZE: usize = 30;
/// Offset of the first available data offset. 2 bytes.
pub const PAGE_HDR_AVAILABLE_OFFSET: usize = 32;
/// Offset of the first available page tag (equals the tag count). 2 bytes.
pub const PAGE_HDR_TAG_COUNT: usize = 34;
/// Offset of the page flags. 4 bytes.
pub const PAGE_HDR_FLAGS: usize = 36;
/// Offset of the first extended checksum (extended header only). 8 bytes x 3.
pub const PAGE_HDR_EXT_CHECKSUMS: usize = 40;
/// Offset of the 64-bit page number (extended header only). 8 bytes.
pub const PAGE_HDR_EXT_PAGE_NUMBER: usize = 64;

// ── Page flags ──────────────────────────────────────────────────────

/// Root page of a tree.
pub const PAGE_FLAG_ROOT: u32 = 0x0000_0001;
/// Leaf page; tag values are user records.
pub const PAGE_FLAG_LEAF: u32 = 0x0000_0002;
/// Branch page; tag values reference child pages.
pub const PAGE_FLAG_PARENT: u32 = 0x0000_0004;
/// Page holds no values.
pub const PAGE_FLAG_EMPTY: u32 = 0x0000_0008;
/// Page belongs to a space tree.
pub const PAGE_FLAG_SPACE_TREE: u32 = 0x0000_0020;
/// Page belongs to an index tree.
pub const PAGE_FLAG_INDEX: u32 = 0x0000_0040;
/// Page belongs to a long-value tree.
pub const PAGE_FLAG_LONG_VALUE: u32 = 0x0000_0080;
/// Tree allows duplicate keys.
pub const PAGE_FLAG_NON_UNIQUE_KEYS: u32 = 0x0000_0400;
/// Records on this page use the new tagged-value layout.
pub const PAGE_FLAG_NEW_RECORD_FORMAT: u32 = 0x0000_0800;
/// Page carries the 64-bit sub-block checksums and extended header.
pub const PAGE_FLAG_NEW_CHECKSUM_FORMAT: u32 = 0x0000_2000;
/// Page contents were erased by online scrubbing.
pub const PAGE_FLAG_SCRUBBED: u32 = 0x0000_4000;

// ── Page tags ───────────────────────────────────────────────────────

/// Size of one tag entry in bytes.
pub const SIZE_PAGE_TAG: usize = 4;
/// Offset/size mask for the compact (small page) tag format.
pub const TAG_VALUE_MASK_SMALL: u16 = 0x1fff;
/// Offset/size mask for the large page tag format.
pub const TAG_VALUE_MASK_LARGE: u16 = 0x7fff;

/// Tag flag: value superseded by a newer version.
pub const TAG_FLAG_VERSION: u8 = 0x01;
/// Tag flag: value is deleted.
pub const TAG_FLAG_DELETED: u8 = 0x02;
/// Tag flag: value key shares a prefix with the preceding key.
pub const TAG_FLAG_COMMON_KEY: u8 = 0x04;

// ── Reserved page numbers ───────────────────────────────────────────

/// First reserved sentinel page number.
pub const PAGE_NUMBER_SENTINEL_FIRST: u32 = 0x7fff_ff00;
/// Page number of the catalog tree root (FDP 4).
pub const PAGE_NUMBER_CATALOG: u32 = 4;

// ── Record (data definition) layout ─────────────────────────────────

/// Size of the record header in bytes.
pub const SIZE_RECORD_HEADER: usize = 4;
/// Highest column identifier stored in the fixed-size region.
pub const LAST_FIXED_COLUMN_ID: u32 = 127;
/// Lowest column identifier stored in the variable-size region.
pub const FIRST_VARIABLE_COLUMN_ID: u32 = 128;
/// Highest column identifier stored in the variable-size region.
pub const LAST_VARIABLE_COLUMN_ID: u32 = 255;
/// Lowest column identifier stored in the tagged region.
pub const FIRST_TAGGED_COLUMN_ID: u32 = 256;

/// Variable-size offset bit: the column is empty.
pub const VARIABLE_OFFSET_EMPTY: u16 = 0x8000;

/// Tagged entry offset mask for the original record format.
pub const TAGGED_OFFSET_MASK: u16 = 0x3fff;
/// Tagged entry offset mask for the new record format on large pages.
pub const TAGGED_OFFSET_MASK_LARGE: u16 = 0x7fff;
/// Tagged entry offset bit: the value starts with a flags byte
/// (original record format only).
pub const TAGGED_OFFSET_HAS_FLAGS: u16 = 0x4000;

// ── Value flags (per tagged value) ──────────────────────────────────

/// Value is stored in the variable-size representation.
pub const VALUE_FLAG_VARIABLE: u8 = 0x01;
/// Value is compressed (7-bit or LZXPRESS).
pub const VALUE_FLAG_COMPRESSED: u8 = 0x02;
/// Value is a reference into the long-value tree.
pub const VALUE_FLAG_LONG_VALUE: u8 = 0x04;
/// Value is a multi-value payload.
pub const VALUE_FLAG_MULTI_VALUE: u8 = 0x08;
/// Reserved; semantics unconfirmed. Passed through opaquely.
pub const VALUE_FLAG_RESERVED_0X10: u8 = 0x10;

// ── Catalog ─────────────────────────────────────────────────────────

/// Catalog definition type: table.
pub const CATALOG_TYPE_TABLE: u16 = 1;
/// Catalog definition type: column.
pub const CATALOG_TYPE_COLUMN: u16 = 2;
/// Catalog definition type: index.
pub const CATALOG_TYPE_INDEX: u16 = 3;
/// Catalog definition type: long-value tree.
pub const CATALOG_TYPE_LONG_VALUE: u16 = 4;
/// Catalog definition type: callback (ignored for read access).
pub const CATALOG_TYPE_CALLBACK: u16 = 5;

// ── Checksum seeds ──────────────────────────────────────────────────

/// Initial value for the XOR-fold checksums (equal to the file signature).
pub const CHECKSUM_SEED: u32 = 0x89ab_cdef;

// ── Codepages ───────────────────────────────────────────────────────

/// UTF-16 little-endian ("Unicode") codepage.
pub const CODEPAGE_UTF16LE: u32 = 1200;
/// Windows Western codepage.
pub const CODEPAGE_WINDOWS_1252: u32 = 1252;
/// 7-bit ASCII codepage.
pub const CODEPAGE_ASCII: u32 = 20127;

//! ESE database file header parsing.
//!
//! A database begins with two copies of a 668-byte header: the primary at
//! offset 0 and a shadow at offset `page_size`. The header declares the
//! format version and revision, the file type, and the page size: everything
//! needed to address the page array that follows the two header pages.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::ese::checksum::validate_header_checksum;
use crate::ese::constants::*;
use crate::EseError;

/// The kind of file the header declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// A database file with a catalog and tables.
    Database,
    /// A streaming file (`.stm`) holding raw content only.
    Streaming,
}

/// Parsed file header (primary copy).
#[derive(Debug, Clone, Serialize)]
pub struct FileHeader {
    /// Stored XOR checksum of the header.
    pub checksum: u32,
    /// Format version word; 0x620 for every known database.
    pub format_version: u32,
    /// Format revision; gates the record and checksum formats.
    pub format_revision: u32,
    /// Database or streaming file.
    pub file_type: FileType,
    /// Database time at header write.
    pub database_time: u64,
    /// Database signature blob (creation time and computer name).
    #[serde(skip)]
    pub database_signature: [u8; 28],
    /// Database state (clean/dirty shutdown marker).
    pub database_state: u32,
    /// Declared page size in bytes.
    pub page_size: u32,
    /// Whether the stored header checksum verified.
    pub checksum_valid: bool,
}

impl FileHeader {
    /// Parse and validate a file header from a raw 668-byte (or longer)
    /// buffer.
    ///
    /// The signature and format version are hard requirements; a checksum
    /// mismatch is recorded in `checksum_valid` but does not fail the parse.
    pub fn parse(data: &[u8]) -> Result<Self, EseError> {
        if data.len() < SIZE_FILE_HEADER {
            return Err(EseError::Format(format!(
                "File header truncated: {} of {} bytes",
                data.len(),
                SIZE_FILE_HEADER
            )));
        }

        let signature = LittleEndian::read_u32(&data[FILE_HDR_SIGNATURE..]);
        if signature != FILE_SIGNATURE {
            return Err(EseError::Format(format!(
                "Bad file signature: {:#010x} (expected {:#010x})",
                signature, FILE_SIGNATURE
            )));
        }

        let format_version = LittleEndian::read_u32(&data[FILE_HDR_FORMAT_VERSION..]);
        if format_version != FORMAT_VERSION {
            return Err(EseError::Unsupported(format!(
                "Unsupported format version {:#x}",
                format_version
            )));
        }

        let file_type = match LittleEndian::read_u32(&data[FILE_HDR_FILE_TYPE..]) {
            0 => FileType::Database,
            1 => FileType::Streaming,
            other => {
                return Err(EseError::Unsupported(format!(
                    "Unknown file type {}",
                    other
                )))
            }
        };

        let page_size = LittleEndian::read_u32(&data[FILE_HDR_PAGE_SIZE..]);
        if !VALID_PAGE_SIZES.contains(&page_size) {
            return Err(EseError::Format(format!(
                "Invalid page size {} (expected one of {:?})",
                page_size, VALID_PAGE_SIZES
            )));
        }

        let mut database_signature = [0u8; 28];
        database_signature.copy_from_slice(
            &data[FILE_HDR_DATABASE_SIGNATURE..FILE_HDR_DATABASE_SIGNATURE + 28],
        );

        let checksum_result = validate_header_checksum(&data[..SIZE_FILE_HEADER]);

        Ok(FileHeader {
            checksum: LittleEndian::read_u32(&data[FILE_HDR_CHECKSUM..]),
            format_version,
            format_revision: LittleEndian::read_u32(&data[FILE_HDR_FORMAT_REVISION..]),
            file_type,
            database_time: LittleEndian::read_u64(&data[FILE_HDR_DATABASE_TIME..]),
            database_signature,
            database_state: LittleEndian::read_u32(&data[FILE_HDR_DATABASE_STATE..]),
            page_size,
            checksum_valid: checksum_result.valid,
        })
    }

    /// Returns true when pages carry the new tagged-record layout.
    pub fn has_new_record_format(&self) -> bool {
        self.format_revision >= FORMAT_REVISION_NEW_RECORD
    }

    /// Returns true when pages carry the 64-bit sub-block checksums.
    pub fn has_new_checksum_format(&self) -> bool {
        self.format_revision >= FORMAT_REVISION_NEW_CHECKSUM
    }

    /// Byte offset of a page in the file.
    ///
    /// Pages are numbered from 1; the two header copies occupy the space of
    /// the first two pages, so page N starts at `(N + 1) * page_size`.
    pub fn page_offset(&self, page_number: u32) -> u64 {
        (page_number as u64 + 1) * self.page_size as u64
    }

    /// Compare the primary header against the shadow copy.
    ///
    /// Returns true when the version, revision, and page size agree. A
    /// mismatch is tolerated (the primary wins) but worth a warning.
    pub fn matches_shadow(&self, shadow: &FileHeader) -> bool {
        self.format_version == shadow.format_version
            && self.format_revision == shadow.format_revision
            && self.page_size == shadow.page_size
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ese::checksum::calculate_header_checksum;

    pub(crate) fn build_header(revision: u32, page_size: u32, file_type: u32) -> Vec<u8> {
        let mut data = vec![0u8; SIZE_FILE_HEADER];
        LittleEndian::write_u32(&mut data[FILE_HDR_SIGNATURE..], FILE_SIGNATURE);
        LittleEndian::write_u32(&mut data[FILE_HDR_FORMAT_VERSION..], FORMAT_VERSION);
        LittleEndian::write_u32(&mut data[FILE_HDR_FILE_TYPE..], file_type);
        LittleEndian::write_u64(&mut data[FILE_HDR_DATABASE_TIME..], 12345);
        LittleEndian::write_u32(&mut data[FILE_HDR_FORMAT_REVISION..], revision);
        LittleEndian::write_u32(&mut data[FILE_HDR_PAGE_SIZE..], page_size);
        let checksum = calculate_header_checksum(&data);
        LittleEndian::write_u32(&mut data[FILE_HDR_CHECKSUM..], checksum);
        data
    }

    #[test]
    fn test_parse_valid_header() {
        let data = build_header(0x0b, 8192, 0);
        let header = FileHeader::parse(&data).unwrap();
        assert_eq!(header.format_version, 0x620);
        assert_eq!(header.format_revision, 0x0b);
        assert_eq!(header.page_size, 8192);
        assert_eq!(header.file_type, FileType::Database);
        assert!(header.checksum_valid);
        assert!(!header.has_new_record_format());
        assert!(!header.has_new_checksum_format());
    }

    #[test]
    fn test_parse_streaming_type() {
        let data = build_header(0x0b, 8192, 1);
        let header = FileHeader::parse(&data).unwrap();
        assert_eq!(header.file_type, FileType::Streaming);
    }

    #[test]
    fn test_format_gates() {
        let header = FileHeader::parse(&build_header(0x11, 16384, 0)).unwrap();
        assert!(header.has_new_record_format());
        assert!(!header.has_new_checksum_format());

        let header = FileHeader::parse(&build_header(0x17, 32768, 0)).unwrap();
        assert!(header.has_new_record_format());
        assert!(header.has_new_checksum_format());
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut data = build_header(0x0b, 8192, 0);
        LittleEndian::write_u32(&mut data[FILE_HDR_SIGNATURE..], 0xdeadbeef);
        assert!(matches!(
            FileHeader::parse(&data),
            Err(EseError::Format(_))
        ));
    }

    #[test]
    fn test_bad_page_size_rejected() {
        let data = build_header(0x0b, 1234, 0);
        assert!(FileHeader::parse(&data).is_err());
    }

    #[test]
    fn test_checksum_mismatch_tolerated() {
        let mut data = build_header(0x0b, 8192, 0);
        data[FILE_HDR_DATABASE_STATE] ^= 1;
        let header = FileHeader::parse(&data).unwrap();
        assert!(!header.checksum_valid);
    }

    #[test]
    fn test_page_offset() {
        let header = FileHeader::parse(&build_header(0x0b, 8192, 0)).unwrap();
        // Two header pages, then page 1.
        assert_eq!(header.page_offset(1), 16384);
        assert_eq!(header.page_offset(4), 40960);
    }
}

//! Long-value reassembly.
//!
//! Column values too large for in-row storage live in a table's long-value
//! tree. Leaf keys are big-endian so that lexicographic order matches
//! numeric order: a 4-byte key `{lv_id:u32be}` marks the *size record*,
//! whose value holds the flags and total byte length; 8-byte keys
//! `{lv_id:u32be, segment_offset:u32be}` mark data segments, each a
//! contiguous fragment at its declared offset.
//!
//! A [`LongValue`] handle indexes the segment chain once, then serves
//! random-access reads by bisecting it, fetching segment bytes through the
//! shared page cache with a small per-handle LRU on top. Gaps between
//! segments are zero-filled only when the size record declares the value
//! sparse; otherwise they are format errors.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::cell::RefCell;
use std::sync::Arc;

use crate::ese::compression;
use crate::ese::tree::{LeafIter, PageReader};
use crate::EseError;

/// Size-record flag: segment data is compressed in place.
pub const LV_FLAG_COMPRESSED: u32 = 0x0000_0001;
/// Size-record flag: the segment chain may have zero-filled gaps.
pub const LV_FLAG_SPARSE: u32 = 0x0000_0002;

/// Segments cached per handle.
const SEGMENT_LRU_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Segment {
    /// Byte offset of this fragment within the long value.
    offset: u32,
    /// Fragment length.
    length: u32,
    /// Where the fragment's bytes live.
    page_number: u32,
    tag_index: usize,
    /// Bytes of key material before the fragment in the tag value.
    value_skip: usize,
}

/// A read-only cursor over one long value.
pub struct LongValue<'a> {
    reader: &'a dyn PageReader,
    id: u32,
    size: u32,
    flags: u32,
    segments: Vec<Segment>,
    lru: RefCell<Vec<(u32, Arc<Vec<u8>>)>>,
}

impl<'a> LongValue<'a> {
    /// Locate a long value by ID in the tree rooted at `lv_root`.
    ///
    /// Walks the tree once to index the size record and segment chain; the
    /// segment bytes themselves are fetched lazily on read.
    pub fn open(reader: &'a dyn PageReader, lv_root: u32, id: u32) -> Result<Self, EseError> {
        let id_key = id.to_be_bytes();
        let mut size_record: Option<(u32, u32)> = None;
        let mut segments: Vec<Segment> = Vec::new();

        for entry in LeafIter::new(reader, lv_root) {
            let entry = entry?;
            if entry.key.len() == 4 {
                if entry.key[..] != id_key {
                    continue;
                }
                if entry.data.len() < 8 {
                    return Err(EseError::Format(format!(
                        "Long value {:#x} size record is {} bytes",
                        id,
                        entry.data.len()
                    )));
                }
                size_record = Some((
                    LittleEndian::read_u32(&entry.data[0..]),
                    LittleEndian::read_u32(&entry.data[4..]),
                ));
            } else if entry.key.len() == 8 && entry.key[..4] == id_key {
                let offset = BigEndian::read_u32(&entry.key[4..]);
                segments.push(Segment {
                    offset,
                    length: entry.data.len() as u32,
                    page_number: entry.page_number,
                    tag_index: entry.tag_index,
                    // entry.data is the tail of the tag value after the key
                    // material; remember how much to skip when re-reading.
                    value_skip: 0,
                });
                // Patch the skip using the tag value length.
                if let Some(segment) = segments.last_mut() {
                    if let Ok(page) = reader.tree_page(entry.page_number) {
                        if let Ok(value) = page.value(entry.tag_index) {
                            segment.value_skip = value.len() - entry.data.len();
                        }
                    }
                }
            }
        }

        let Some((flags, size)) = size_record else {
            return Err(EseError::Format(format!(
                "Long value {:#x} has no size record",
                id
            )));
        };

        segments.sort_by_key(|s| s.offset);
        for pair in segments.windows(2) {
            if pair[0].offset + pair[0].length > pair[1].offset {
                return Err(EseError::Format(format!(
                    "Long value {:#x} segments at {} and {} overlap",
                    id, pair[0].offset, pair[1].offset
                )));
            }
        }

        Ok(LongValue {
            reader,
            id,
            size,
            flags,
            segments,
            lru: RefCell::new(Vec::new()),
        })
    }

    /// The long-value ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Declared total size in bytes.
    pub fn size(&self) -> u64 {
        self.size as u64
    }

    /// Size-record flags.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & LV_FLAG_COMPRESSED != 0
    }

    pub fn is_sparse(&self) -> bool {
        self.flags & LV_FLAG_SPARSE != 0
    }

    /// Fetch one segment's bytes through the handle LRU and page cache.
    fn segment_bytes(&self, segment: &Segment) -> Result<Arc<Vec<u8>>, EseError> {
        {
            let mut lru = self.lru.borrow_mut();
            if let Some(position) = lru.iter().position(|(offset, _)| *offset == segment.offset) {
                let entry = lru.remove(position);
                let bytes = Arc::clone(&entry.1);
                lru.push(entry);
                return Ok(bytes);
            }
        }

        let page = self.reader.tree_page(segment.page_number)?;
        let value = page.value(segment.tag_index)?;
        if value.len() < segment.value_skip + segment.length as usize {
            return Err(EseError::Format(format!(
                "Long value {:#x} segment at {} shrank on re-read",
                self.id, segment.offset
            )));
        }
        let bytes = Arc::new(
            value[segment.value_skip..segment.value_skip + segment.length as usize].to_vec(),
        );

        let mut lru = self.lru.borrow_mut();
        if lru.len() >= SEGMENT_LRU_CAPACITY {
            lru.remove(0);
        }
        lru.push((segment.offset, Arc::clone(&bytes)));
        Ok(bytes)
    }

    /// Random-access read of `buf.len()` bytes at offset `at`.
    ///
    /// Returns the number of bytes read, short only at end of value. Bytes
    /// in inter-segment gaps read as zero when the value is sparse and fail
    /// otherwise.
    pub fn read(&self, at: u64, buf: &mut [u8]) -> Result<usize, EseError> {
        if at >= self.size() {
            return Ok(0);
        }
        let want = buf.len().min((self.size() - at) as usize);
        let buf = &mut buf[..want];
        buf.fill(0);

        let start = at as u32;
        let end = start + want as u32;

        // Bisect to the first segment that could overlap the range.
        let mut index = self
            .segments
            .partition_point(|s| s.offset + s.length <= start);
        let mut covered = start;

        while covered < end {
            let Some(segment) = self.segments.get(index) else {
                break;
            };
            if segment.offset >= end {
                break;
            }
            if segment.offset > covered && !self.is_sparse() {
                return Err(EseError::Format(format!(
                    "Long value {:#x} has a gap at offset {}",
                    self.id, covered
                )));
            }
            let bytes = self.segment_bytes(segment)?;
            let copy_start = covered.max(segment.offset);
            let copy_end = end.min(segment.offset + segment.length);
            let src = (copy_start - segment.offset) as usize..(copy_end - segment.offset) as usize;
            let dst = (copy_start - start) as usize..(copy_end - start) as usize;
            buf[dst].copy_from_slice(&bytes[src]);
            covered = copy_end;
            index += 1;
        }

        if covered < end && !self.is_sparse() {
            return Err(EseError::Format(format!(
                "Long value {:#x} ends at {} of declared {} bytes",
                self.id, covered, self.size
            )));
        }
        Ok(want)
    }

    /// Read the whole value.
    pub fn read_all(&self) -> Result<Vec<u8>, EseError> {
        let mut buf = vec![0u8; self.size() as usize];
        let read = self.read(0, &mut buf)?;
        if read != buf.len() {
            return Err(EseError::Format(format!(
                "Long value {:#x} read {} of {} bytes",
                self.id,
                read,
                buf.len()
            )));
        }
        Ok(buf)
    }

    /// Read the whole value, undoing in-place compression when flagged.
    pub fn read_all_decompressed(&self) -> Result<Vec<u8>, EseError> {
        let data = self.read_all()?;
        if self.is_compressed() {
            compression::decompress(&data)
        } else {
            Ok(data)
        }
    }

    /// The whole value as UTF-8 text, honoring the given codepage.
    pub fn as_utf8(&self, codepage: u32) -> Result<String, EseError> {
        let data = self.read_all_decompressed()?;
        if codepage == crate::ese::constants::CODEPAGE_UTF16LE {
            if data.len() % 2 != 0 {
                return Err(EseError::Format(format!(
                    "Long value {:#x} holds an odd {} UTF-16 bytes",
                    self.id,
                    data.len()
                )));
            }
            let units: Vec<u16> = data.chunks_exact(2).map(LittleEndian::read_u16).collect();
            String::from_utf16(&units)
                .map_err(|e| EseError::Format(format!("Long value {:#x}: {}", self.id, e)))
        } else {
            Ok(data.iter().map(|&b| b as char).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ese::constants::*;
    use crate::ese::page::tests::build_raw_page;
    use crate::ese::tree::tests::{leaf_value, MapReader};

    fn lv_size_key(id: u32) -> Vec<u8> {
        id.to_be_bytes().to_vec()
    }

    fn lv_segment_key(id: u32, offset: u32) -> Vec<u8> {
        let mut key = id.to_be_bytes().to_vec();
        key.extend_from_slice(&offset.to_be_bytes());
        key
    }

    fn size_record(flags: u32, size: u32) -> Vec<u8> {
        let mut data = vec![0u8; 8];
        LittleEndian::write_u32(&mut data[0..], flags);
        LittleEndian::write_u32(&mut data[4..], size);
        data
    }

    /// One-page LV tree at page 30 holding one value's records.
    fn install_lv_tree(reader: &mut MapReader, id: u32, flags: u32, size: u32, segments: &[(u32, &[u8])]) {
        let mut values: Vec<Vec<u8>> = vec![vec![0u8; 16]];
        values.push(leaf_value(&lv_size_key(id), &size_record(flags, size)));
        for (offset, data) in segments {
            values.push(leaf_value(&lv_segment_key(id, *offset), data));
        }
        let refs: Vec<(&[u8], u8)> = values.iter().map(|v| (v.as_slice(), 0)).collect();
        reader.insert_raw(
            30,
            build_raw_page(
                30,
                2048,
                PAGE_FLAG_ROOT | PAGE_FLAG_LEAF | PAGE_FLAG_LONG_VALUE,
                30,
                0,
                0,
                &refs,
            ),
        );
    }

    #[test]
    fn test_reassemble_contiguous_segments() {
        let mut reader = MapReader::new();
        install_lv_tree(
            &mut reader,
            0x0100,
            0,
            10,
            &[(0, b"hello "), (6, b"john")],
        );

        let lv = LongValue::open(&reader, 30, 0x0100).unwrap();
        assert_eq!(lv.size(), 10);
        assert_eq!(lv.read_all().unwrap(), b"hello john");
    }

    #[test]
    fn test_random_access_read() {
        let mut reader = MapReader::new();
        install_lv_tree(
            &mut reader,
            7,
            0,
            10,
            &[(0, b"hello "), (6, b"john")],
        );
        let lv = LongValue::open(&reader, 30, 7).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(lv.read(4, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"o jo");

        // Read past the end is short.
        let mut buf = [0u8; 8];
        assert_eq!(lv.read(8, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"hn");
        assert_eq!(lv.read(100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_gap_errors_when_not_sparse() {
        let mut reader = MapReader::new();
        install_lv_tree(&mut reader, 7, 0, 8, &[(0, b"ab"), (6, b"yz")]);
        let lv = LongValue::open(&reader, 30, 7).unwrap();
        assert!(lv.read_all().is_err());
    }

    #[test]
    fn test_gap_zero_filled_when_sparse() {
        let mut reader = MapReader::new();
        install_lv_tree(&mut reader, 7, LV_FLAG_SPARSE, 8, &[(0, b"ab"), (6, b"yz")]);
        let lv = LongValue::open(&reader, 30, 7).unwrap();
        assert_eq!(lv.read_all().unwrap(), b"ab\0\0\0\0yz");
    }

    #[test]
    fn test_missing_size_record() {
        let mut reader = MapReader::new();
        install_lv_tree(&mut reader, 7, 0, 4, &[(0, b"data")]);
        assert!(LongValue::open(&reader, 30, 99).is_err());
    }

    #[test]
    fn test_multiple_values_in_one_tree() {
        let mut reader = MapReader::new();
        let mut values: Vec<Vec<u8>> = vec![vec![0u8; 16]];
        values.push(leaf_value(&lv_size_key(1), &size_record(0, 3)));
        values.push(leaf_value(&lv_segment_key(1, 0), b"one"));
        values.push(leaf_value(&lv_size_key(2), &size_record(0, 3)));
        values.push(leaf_value(&lv_segment_key(2, 0), b"two"));
        let refs: Vec<(&[u8], u8)> = values.iter().map(|v| (v.as_slice(), 0)).collect();
        reader.insert_raw(
            30,
            build_raw_page(30, 2048, PAGE_FLAG_ROOT | PAGE_FLAG_LEAF, 30, 0, 0, &refs),
        );

        let lv1 = LongValue::open(&reader, 30, 1).unwrap();
        let lv2 = LongValue::open(&reader, 30, 2).unwrap();
        assert_eq!(lv1.read_all().unwrap(), b"one");
        assert_eq!(lv2.read_all().unwrap(), b"two");
    }

    #[test]
    fn test_compressed_long_value() {
        use crate::ese::compression::tests_support::LZXPRESS;
        let mut reader = MapReader::new();
        install_lv_tree(
            &mut reader,
            7,
            LV_FLAG_COMPRESSED,
            LZXPRESS.len() as u32,
            &[(0, &LZXPRESS)],
        );
        let lv = LongValue::open(&reader, 30, 7).unwrap();
        assert_eq!(
            lv.read_all_decompressed().unwrap(),
            b"abcdefghijklmnopqrstuvwxyz"
        );
        assert_eq!(lv.as_utf8(CODEPAGE_ASCII).unwrap(), "abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_three_segment_value_in_key_order() {
        let mut reader = MapReader::new();
        let seg1 = vec![b'a'; 700];
        let seg2 = vec![b'b'; 700];
        let seg3 = vec![b'c'; 100];
        install_lv_tree(
            &mut reader,
            3,
            0,
            1500,
            &[(0, &seg1), (700, &seg2), (1400, &seg3)],
        );
        let lv = LongValue::open(&reader, 30, 3).unwrap();
        assert_eq!(lv.size(), 1500);
        let all = lv.read_all().unwrap();
        assert_eq!(all.len(), 1500);
        assert!(all[..700].iter().all(|&b| b == b'a'));
        assert!(all[700..1400].iter().all(|&b| b == b'b'));
        assert!(all[1400..].iter().all(|&b| b == b'c'));
    }
}

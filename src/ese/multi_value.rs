//! Multi-value payload splitting.
//!
//! A tagged column flagged multi-value packs an ordered sequence of
//! sub-values into one payload. Two encodings exist:
//!
//! - **Offset table** (the common case): a run of 16-bit offsets, one per
//!   element, where the first offset, masked of its high bit, doubles as
//!   the size of the offset table, so the element count is that offset
//!   divided by two. Element `i` spans `offset[i]..offset[i+1]`, the last
//!   running to the end of the payload.
//!
//! - **Fixed stride** (reserved-flag variant): the first payload byte is
//!   the element width; the remaining bytes divide into that many equal
//!   elements.
//!
//! The decoder picks the encoding from the value flags that accompanied the
//! payload and fails loudly on any offset that walks outside the payload.

use crate::ese::catalog::ColumnDefinition;
use crate::ese::constants::*;
use crate::ese::record::{decode_text, DateTimeRepr, RawValue, Value, ValueStorage};
use crate::EseError;
use byteorder::{ByteOrder, LittleEndian};

/// The payload encoding of a multi-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiValueEncoding {
    OffsetTable,
    FixedStride,
}

impl MultiValueEncoding {
    /// Choose the encoding from the value's flags: the reserved 0x10 flag
    /// marks the fixed-stride form.
    pub fn from_flags(flags: u8) -> Self {
        if flags & VALUE_FLAG_RESERVED_0X10 != 0 {
            MultiValueEncoding::FixedStride
        } else {
            MultiValueEncoding::OffsetTable
        }
    }
}

/// An ordered sequence of sub-values split out of one column payload.
#[derive(Debug, Clone)]
pub struct MultiValue {
    elements: Vec<Vec<u8>>,
    encoding: MultiValueEncoding,
}

impl MultiValue {
    /// Split a multi-value payload.
    pub fn parse(payload: &[u8], encoding: MultiValueEncoding) -> Result<Self, EseError> {
        match encoding {
            MultiValueEncoding::OffsetTable => Self::parse_offset_table(payload),
            MultiValueEncoding::FixedStride => Self::parse_fixed_stride(payload),
        }
    }

    fn parse_offset_table(payload: &[u8]) -> Result<Self, EseError> {
        if payload.len() < 2 {
            return Err(EseError::Format(
                "Multi-value payload too short for an offset table".into(),
            ));
        }

        let first = LittleEndian::read_u16(&payload[0..]) & 0x7fff;
        if first == 0 || first % 2 != 0 || first as usize > payload.len() {
            return Err(EseError::Format(format!(
                "Multi-value first offset {} does not delimit an offset table",
                first
            )));
        }
        let count = first as usize / 2;

        let mut offsets = Vec::with_capacity(count + 1);
        for slot in 0..count {
            let offset = (LittleEndian::read_u16(&payload[slot * 2..]) & 0x7fff) as usize;
            if offset > payload.len() {
                return Err(EseError::Format(format!(
                    "Multi-value element {} starts at {} past the {} byte payload",
                    slot,
                    offset,
                    payload.len()
                )));
            }
            if let Some(&previous) = offsets.last() {
                if offset < previous {
                    return Err(EseError::Format(format!(
                        "Multi-value offsets regress at element {}",
                        slot
                    )));
                }
            }
            offsets.push(offset);
        }
        offsets.push(payload.len());

        let elements = offsets
            .windows(2)
            .map(|pair| payload[pair[0]..pair[1]].to_vec())
            .collect();

        Ok(MultiValue {
            elements,
            encoding: MultiValueEncoding::OffsetTable,
        })
    }

    fn parse_fixed_stride(payload: &[u8]) -> Result<Self, EseError> {
        let Some((&width, rest)) = payload.split_first() else {
            return Err(EseError::Format("Empty fixed-stride multi-value".into()));
        };
        if width == 0 {
            return Err(EseError::Format(
                "Fixed-stride multi-value with zero element width".into(),
            ));
        }
        let width = width as usize;

        let elements = rest
            .chunks_exact(width)
            .map(|chunk| chunk.to_vec())
            .collect();

        Ok(MultiValue {
            elements,
            encoding: MultiValueEncoding::FixedStride,
        })
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The encoding the payload used.
    pub fn encoding(&self) -> MultiValueEncoding {
        self.encoding
    }

    /// Raw bytes of element `index`.
    pub fn element(&self, index: usize) -> Result<&[u8], EseError> {
        self.elements
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                EseError::Bounds(format!(
                    "Multi-value element {} of {}",
                    index,
                    self.elements.len()
                ))
            })
    }

    /// Element `index` decoded as the parent column's type.
    pub fn typed_element(
        &self,
        column: &ColumnDefinition,
        index: usize,
    ) -> Result<Value, EseError> {
        let bytes = self.element(index)?;
        // Elements inherit the column type; reuse the scalar decoding path
        // via a synthetic single-value record entry.
        let raw = RawValue {
            data: bytes.to_vec(),
            flags: 0,
            storage: ValueStorage::Tagged,
        };
        let columns = std::slice::from_ref(column);
        let decoder =
            crate::ese::record::RecordDecoder::new(columns, false, DateTimeRepr::OleDouble);
        decoder.typed_value(column, &raw)
    }

    /// Element `index` decoded as text per the column codepage.
    pub fn element_text(
        &self,
        column: &ColumnDefinition,
        index: usize,
    ) -> Result<String, EseError> {
        decode_text(column, self.element(index)?, false)
    }
}

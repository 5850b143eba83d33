//! Record (data definition) decoding.
//!
//! A record is the payload of one leaf entry on a table tree. Its layout is
//! a 4-byte header (last fixed column ID, last variable column ID, and the
//! offset of the variable region) followed by three regions:
//!
//! 1. **Fixed**: the values of columns 1..=last_fixed back to back, each at
//!    its type's width, then a null bitmap with one presence bit per fixed
//!    column (LSB = column 1).
//! 2. **Variable**: for columns 128..=last_variable, an array of 16-bit
//!    cumulative end offsets (bit 15 = empty) followed by the packed data.
//! 3. **Tagged**: sparse `{column_id, offset}` entries sorted by column ID,
//!    with per-value flags marking compressed, long-value, and multi-value
//!    payloads. The flag byte's position depends on the record format
//!    generation: old-format entries advertise it in offset bit 0x4000, new
//!    format (revision 0x11+, large pages) always prefixes the value.
//!
//! The decoder maps raw record bytes to per-column [`RawValue`]s and the
//! typed [`Value`] view on top of them.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::ese::catalog::ColumnDefinition;
use crate::ese::column_types::ColumnType;
use crate::ese::compression;
use crate::ese::constants::*;
use crate::EseError;

/// How a DATE_TIME column's 8 bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateTimeRepr {
    /// OLE automation date: days since 1899-12-30 as an IEEE double.
    OleDouble,
    /// Windows FILETIME: 100ns ticks since 1601-01-01, little-endian.
    Filetime,
    /// FILETIME stored big-endian (seen in some Exchange columns).
    FiletimeBigEndian,
}

/// Storage region a value was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueStorage {
    Fixed,
    Variable,
    Tagged,
}

/// One column's raw bytes and flags, before typed interpretation.
#[derive(Debug, Clone)]
pub struct RawValue {
    pub data: Vec<u8>,
    pub flags: u8,
    pub storage: ValueStorage,
}

impl RawValue {
    pub fn is_compressed(&self) -> bool {
        self.flags & VALUE_FLAG_COMPRESSED != 0
    }

    pub fn is_long_value(&self) -> bool {
        self.flags & VALUE_FLAG_LONG_VALUE != 0
    }

    pub fn is_multi_value(&self) -> bool {
        self.flags & VALUE_FLAG_MULTI_VALUE != 0
    }

    pub fn has_reserved_flag(&self) -> bool {
        self.flags & VALUE_FLAG_RESERVED_0X10 != 0
    }
}

/// A typed column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// Column absent from the record or marked null.
    Null,
    Boolean(bool),
    UnsignedByte(u8),
    Short(i16),
    Long(i32),
    Currency(i64),
    IeeeSingle(f32),
    IeeeDouble(f64),
    /// OLE automation date.
    OleDateTime(f64),
    /// Windows FILETIME ticks.
    Filetime(u64),
    Binary(Vec<u8>),
    Text(String),
    UnsignedLong(u32),
    LongLong(i64),
    Guid([u8; 16]),
    UnsignedShort(u16),
    /// Reference into the long-value tree; resolve through
    /// [`Record::long_value`](crate::ese::table::Record::long_value).
    LongValueRef(u32),
    /// Multi-value payload; resolve through
    /// [`Record::multi_value`](crate::ese::table::Record::multi_value).
    MultiValue(Vec<u8>),
    /// Bytes surfaced uninterpreted (unknown flag combinations, including
    /// the reserved 0x10 flag alongside multi-value).
    Raw(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A decoded record: one optional raw value per catalog column, in catalog
/// (ascending column ID) order.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    values: Vec<Option<RawValue>>,
}

impl DecodedRecord {
    /// Raw value of the column at `index` within the decoder's column list.
    pub fn raw(&self, index: usize) -> Result<Option<&RawValue>, EseError> {
        self.values
            .get(index)
            .map(Option::as_ref)
            .ok_or_else(|| EseError::Bounds(format!("Column index {} of {}", index, self.values.len())))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decodes records of one table.
pub struct RecordDecoder<'a> {
    columns: &'a [ColumnDefinition],
    /// Revision 0x11+ with large pages: tagged values always carry a
    /// leading flags byte and use the wider offset mask.
    new_tagged_format: bool,
    /// Interpretation for DATE_TIME columns without a per-column hint.
    default_datetime: DateTimeRepr,
}

impl<'a> RecordDecoder<'a> {
    /// Create a decoder over columns sorted by ascending identifier.
    pub fn new(
        columns: &'a [ColumnDefinition],
        new_tagged_format: bool,
        default_datetime: DateTimeRepr,
    ) -> Self {
        RecordDecoder {
            columns,
            new_tagged_format,
            default_datetime,
        }
    }

    /// Decode one record's bytes into per-column raw values.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedRecord, EseError> {
        if data.len() < SIZE_RECORD_HEADER {
            return Err(EseError::Format(format!(
                "Record of {} bytes is shorter than its header",
                data.len()
            )));
        }

        let last_fixed = data[0] as u32;
        let last_variable = data[1] as u32;
        let variable_offset = LittleEndian::read_u16(&data[2..]) as usize;

        if last_fixed > LAST_FIXED_COLUMN_ID {
            return Err(EseError::Format(format!(
                "Record claims fixed columns up to {}",
                last_fixed
            )));
        }
        if last_variable < FIRST_VARIABLE_COLUMN_ID - 1 {
            return Err(EseError::Format(format!(
                "Record claims last variable column {}",
                last_variable
            )));
        }
        if variable_offset < SIZE_RECORD_HEADER || variable_offset > data.len() {
            return Err(EseError::Format(format!(
                "Variable region offset {} outside record of {} bytes",
                variable_offset,
                data.len()
            )));
        }

        let mut values: Vec<Option<RawValue>> = vec![None; self.columns.len()];

        self.decode_fixed(data, last_fixed, variable_offset, &mut values)?;
        let tagged_start =
            self.decode_variable(data, last_variable, variable_offset, &mut values)?;
        self.decode_tagged(data, tagged_start, &mut values)?;

        Ok(DecodedRecord { values })
    }

    fn decode_fixed(
        &self,
        data: &[u8],
        last_fixed: u32,
        variable_offset: usize,
        values: &mut [Option<RawValue>],
    ) -> Result<(), EseError> {
        if last_fixed == 0 {
            return Ok(());
        }

        let bitmap_size = (last_fixed as usize).div_ceil(8);
        let mut offset = SIZE_RECORD_HEADER;

        // Columns are sorted by identifier; each fixed column up to
        // last_fixed consumes its width whether present or null.
        for (index, column) in self.columns.iter().enumerate() {
            if column.identifier == 0 || column.identifier > last_fixed {
                continue;
            }
            let width = column
                .column_type
                .fixed_size()
                .unwrap_or(column.size as usize);
            let end = offset + width;
            if end + bitmap_size > variable_offset {
                return Err(EseError::Format(format!(
                    "Fixed column {} overruns the fixed region",
                    column.identifier
                )));
            }

            values[index] = Some(RawValue {
                data: data[offset..end].to_vec(),
                flags: 0,
                storage: ValueStorage::Fixed,
            });
            offset = end;
        }

        // Apply the null bitmap: a clear bit withdraws the value.
        if offset + bitmap_size > variable_offset {
            return Err(EseError::Format(
                "Fixed-column null bitmap overruns the fixed region".into(),
            ));
        }
        let bitmap = &data[offset..offset + bitmap_size];
        for (index, column) in self.columns.iter().enumerate() {
            if column.identifier == 0 || column.identifier > last_fixed {
                continue;
            }
            let bit = column.identifier as usize - 1;
            let present = bitmap[bit / 8] & (1 << (bit % 8)) != 0;
            if !present {
                values[index] = None;
            }
        }
        Ok(())
    }

    fn decode_variable(
        &self,
        data: &[u8],
        last_variable: u32,
        variable_offset: usize,
        values: &mut [Option<RawValue>],
    ) -> Result<usize, EseError> {
        let count = last_variable.saturating_sub(FIRST_VARIABLE_COLUMN_ID - 1) as usize;
        if count == 0 {
            return Ok(variable_offset);
        }

        let offsets_end = variable_offset + 2 * count;
        if offsets_end > data.len() {
            return Err(EseError::Format(
                "Variable-size offset array overruns the record".into(),
            ));
        }

        let data_start = offsets_end;
        let mut previous_end = 0usize;
        for slot in 0..count {
            let word = LittleEndian::read_u16(&data[variable_offset + 2 * slot..]);
            let empty = word & VARIABLE_OFFSET_EMPTY != 0;
            let end = (word & !VARIABLE_OFFSET_EMPTY) as usize;
            if end < previous_end {
                return Err(EseError::Format(format!(
                    "Variable-size offsets regress at slot {}",
                    slot
                )));
            }
            if data_start + end > data.len() {
                return Err(EseError::Format(format!(
                    "Variable column data at slot {} overruns the record",
                    slot
                )));
            }

            let identifier = FIRST_VARIABLE_COLUMN_ID + slot as u32;
            if !empty {
                if let Some(index) = self
                    .columns
                    .iter()
                    .position(|c| c.identifier == identifier)
                {
                    values[index] = Some(RawValue {
                        data: data[data_start + previous_end..data_start + end].to_vec(),
                        flags: VALUE_FLAG_VARIABLE,
                        storage: ValueStorage::Variable,
                    });
                }
                previous_end = end;
            }
        }

        Ok(data_start + previous_end)
    }

    fn decode_tagged(
        &self,
        data: &[u8],
        tagged_start: usize,
        values: &mut [Option<RawValue>],
    ) -> Result<(), EseError> {
        if tagged_start >= data.len() {
            return Ok(());
        }
        let region = &data[tagged_start..];
        if region.len() < 4 {
            return Err(EseError::Format(
                "Tagged region too short for an entry".into(),
            ));
        }

        let offset_mask = if self.new_tagged_format {
            TAGGED_OFFSET_MASK_LARGE
        } else {
            TAGGED_OFFSET_MASK
        };

        let first_offset_word = LittleEndian::read_u16(&region[2..]);
        let index_size = (first_offset_word & offset_mask) as usize;
        if index_size < 4 || index_size % 4 != 0 || index_size > region.len() {
            return Err(EseError::Format(format!(
                "Tagged entry index of {} bytes is malformed",
                index_size
            )));
        }
        let entry_count = index_size / 4;

        let mut entries = Vec::with_capacity(entry_count);
        let mut previous_id = 0u32;
        for slot in 0..entry_count {
            let identifier = LittleEndian::read_u16(&region[slot * 4..]) as u32;
            let offset_word = LittleEndian::read_u16(&region[slot * 4 + 2..]);
            if identifier <= previous_id {
                return Err(EseError::Format(format!(
                    "Tagged entries out of order at column {}",
                    identifier
                )));
            }
            previous_id = identifier;
            entries.push((identifier, offset_word));
        }

        for slot in 0..entry_count {
            let (identifier, offset_word) = entries[slot];
            let start = (offset_word & offset_mask) as usize;
            let end = if slot + 1 < entry_count {
                (entries[slot + 1].1 & offset_mask) as usize
            } else {
                region.len()
            };
            if start > end || end > region.len() {
                return Err(EseError::Format(format!(
                    "Tagged value for column {} has offsets {}..{} outside the region",
                    identifier, start, end
                )));
            }

            let mut value = &region[start..end];
            let mut flags = 0u8;
            if self.new_tagged_format {
                if !value.is_empty() {
                    flags = value[0];
                    value = &value[1..];
                }
            } else if offset_word & TAGGED_OFFSET_HAS_FLAGS != 0 {
                if value.is_empty() {
                    return Err(EseError::Format(format!(
                        "Tagged value for column {} advertises flags but is empty",
                        identifier
                    )));
                }
                flags = value[0];
                value = &value[1..];
            }

            if let Some(index) = self
                .columns
                .iter()
                .position(|c| c.identifier == identifier)
            {
                values[index] = Some(RawValue {
                    data: value.to_vec(),
                    flags,
                    storage: ValueStorage::Tagged,
                });
            }
        }

        Ok(())
    }

    /// Interpret a raw value as its column's type.
    pub fn typed_value(
        &self,
        column: &ColumnDefinition,
        raw: &RawValue,
    ) -> Result<Value, EseError> {
        // Long-value references and multi-values resolve through their own
        // handles; unknown flag mixes fall back to raw bytes.
        if raw.is_long_value() {
            if raw.data.len() < 4 {
                return Err(EseError::Format(format!(
                    "Long-value reference in column {} is {} bytes",
                    column.identifier,
                    raw.data.len()
                )));
            }
            return Ok(Value::LongValueRef(LittleEndian::read_u32(&raw.data[0..])));
        }
        if raw.is_multi_value() {
            if raw.has_reserved_flag() {
                return Ok(Value::Raw(raw.data.clone()));
            }
            return Ok(Value::MultiValue(raw.data.clone()));
        }
        if raw.has_reserved_flag() {
            return Ok(Value::Raw(raw.data.clone()));
        }

        let data: Vec<u8>;
        let mut seven_bit_ascii = false;
        let bytes: &[u8] = if raw.is_compressed() {
            seven_bit_ascii = matches!(
                compression::compression_kind(&raw.data),
                Ok(compression::CompressionKind::SevenBitAscii)
            );
            data = compression::decompress(&raw.data)?;
            &data
        } else {
            &raw.data
        };

        decode_typed(column, bytes, seven_bit_ascii, self.default_datetime)
    }
}

/// Decode bytes as a column's declared type.
///
/// `bytes` is the decompressed payload where compression applied; 7-bit
/// UTF-16 and LZXPRESS payloads arrive as codepage-encoded bytes like
/// uncompressed data, while `seven_bit_ascii` marks payloads that are plain
/// bytes regardless of the column codepage.
fn decode_typed(
    column: &ColumnDefinition,
    bytes: &[u8],
    seven_bit_ascii: bool,
    default_datetime: DateTimeRepr,
) -> Result<Value, EseError> {
    let want = |size: usize| -> Result<(), EseError> {
        if bytes.len() != size {
            Err(EseError::Format(format!(
                "Column {} ({}) holds {} bytes, expected {}",
                column.identifier,
                column.column_type,
                bytes.len(),
                size
            )))
        } else {
            Ok(())
        }
    };

    match column.column_type {
        ColumnType::Null => Ok(Value::Null),
        ColumnType::Boolean => {
            want(1)?;
            // Any non-zero byte is true, not only 0xff.
            Ok(Value::Boolean(bytes[0] != 0))
        }
        ColumnType::UnsignedByte => {
            want(1)?;
            Ok(Value::UnsignedByte(bytes[0]))
        }
        ColumnType::Short => {
            want(2)?;
            Ok(Value::Short(LittleEndian::read_i16(bytes)))
        }
        ColumnType::UnsignedShort => {
            want(2)?;
            Ok(Value::UnsignedShort(LittleEndian::read_u16(bytes)))
        }
        ColumnType::Long => {
            want(4)?;
            Ok(Value::Long(LittleEndian::read_i32(bytes)))
        }
        ColumnType::UnsignedLong => {
            want(4)?;
            Ok(Value::UnsignedLong(LittleEndian::read_u32(bytes)))
        }
        ColumnType::Currency | ColumnType::LongLong => {
            want(8)?;
            let value = LittleEndian::read_i64(bytes);
            Ok(match column.column_type {
                ColumnType::Currency => Value::Currency(value),
                _ => Value::LongLong(value),
            })
        }
        ColumnType::IeeeSingle => {
            want(4)?;
            Ok(Value::IeeeSingle(LittleEndian::read_f32(bytes)))
        }
        ColumnType::IeeeDouble => {
            want(8)?;
            Ok(Value::IeeeDouble(LittleEndian::read_f64(bytes)))
        }
        ColumnType::DateTime => {
            want(8)?;
            match column.date_time_repr.unwrap_or(default_datetime) {
                DateTimeRepr::OleDouble => Ok(Value::OleDateTime(LittleEndian::read_f64(bytes))),
                DateTimeRepr::Filetime => Ok(Value::Filetime(LittleEndian::read_u64(bytes))),
                DateTimeRepr::FiletimeBigEndian => {
                    Ok(Value::Filetime(byteorder::BigEndian::read_u64(bytes)))
                }
            }
        }
        ColumnType::Guid => {
            want(16)?;
            let mut guid = [0u8; 16];
            guid.copy_from_slice(bytes);
            Ok(Value::Guid(guid))
        }
        ColumnType::Text | ColumnType::LongText => {
            decode_text(column, bytes, seven_bit_ascii).map(Value::Text)
        }
        ColumnType::Binary | ColumnType::LongBinary | ColumnType::SuperLarge => {
            Ok(Value::Binary(bytes.to_vec()))
        }
    }
}

/// Decode text bytes per the column codepage.
pub fn decode_text(
    column: &ColumnDefinition,
    bytes: &[u8],
    seven_bit_ascii: bool,
) -> Result<String, EseError> {
    // A 7-bit ASCII payload decompresses to plain bytes regardless of the
    // column codepage.
    if seven_bit_ascii {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    match column.codepage {
        CODEPAGE_UTF16LE => {
            if bytes.len() % 2 != 0 {
                return Err(EseError::Format(format!(
                    "UTF-16 column {} holds an odd {} bytes",
                    column.identifier,
                    bytes.len()
                )));
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(LittleEndian::read_u16)
                .collect();
            String::from_utf16(&units).map_err(|e| {
                EseError::Format(format!("Column {} is not valid UTF-16: {}", column.identifier, e))
            })
        }
        // ASCII and the Windows single-byte codepages: map bytes directly.
        _ => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ese::catalog::ColumnDefinition;

    pub(crate) fn column(
        identifier: u32,
        name: &str,
        column_type: ColumnType,
        codepage: u32,
    ) -> ColumnDefinition {
        ColumnDefinition {
            identifier,
            name: name.to_string(),
            column_type,
            codepage,
            flags: 0,
            size: column_type.fixed_size().unwrap_or(0) as u32,
            default_value: None,
            date_time_repr: None,
        }
    }

    /// Record builder mirroring the on-disk layout.
    pub(crate) struct RecordBuilder {
        fixed: Vec<(u32, Vec<u8>)>,
        variable: Vec<(u32, Option<Vec<u8>>)>,
        tagged: Vec<(u32, u8, Vec<u8>)>,
        new_format: bool,
    }

    impl RecordBuilder {
        pub fn new(new_format: bool) -> Self {
            RecordBuilder {
                fixed: Vec::new(),
                variable: Vec::new(),
                tagged: Vec::new(),
                new_format,
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

            let mut record = vec![
                last_fixed as u8,
                last_variable as u8,
                0,
                0,
            ];
            for (_, data) in &self.fixed {
                record.extend_from_slice(data);
            }
            let bitmap_size = (last_fixed as usize).div_ceil(8);
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
            for slot in 0..count {
                let id = FIRST_VARIABLE_COLUMN_ID + slot as u32;
                match self.variable.iter().find(|(vid, _)| *vid == id) {
                    Some((_, Some(data))) => {
                        payload.extend_from_slice(data);
                        end += data.len() as u16;
                        offsets[slot] = end;
                    }
                    _ => offsets[slot] = end | VARIABLE_OFFSET_EMPTY,
                }
            }
            for offset in &offsets {
                record.extend_from_slice(&offset.to_le_bytes());
            }
            record.extend_from_slice(&payload);

            if !self.tagged.is_empty() {
                let entry_count = self.tagged.len();
                let index_size = entry_count * 4;
                let mut offsets = Vec::with_capacity(entry_count);
                let mut payload: Vec<u8> = Vec::new();
                for (_, flags, data) in &self.tagged {
                    let offset = index_size + payload.len();
                    if self.new_format {
                        offsets.push((offset as u16, false));
                        payload.push(*flags);
                        payload.extend_from_slice(data);
                    } else if *flags != 0 {
                        offsets.push((offset as u16, true));
                        payload.push(*flags);
                        payload.extend_from_slice(data);
                    } else {
                        offsets.push((offset as u16, false));
                        payload.extend_from_slice(data);
                    }
                }
                for ((id, _, _), (offset, has_flags)) in self.tagged.iter().zip(&offsets) {
                    record.extend_from_slice(&(*id as u16).to_le_bytes());
                    let word = offset | if *has_flags { TAGGED_OFFSET_HAS_FLAGS } else { 0 };
                    record.extend_from_slice(&word.to_le_bytes());
                }
                record.extend_from_slice(&payload);
            }

            record
        }
    }

    fn decoder_columns() -> Vec<ColumnDefinition> {
        vec![
            column(1, "Id", ColumnType::Long, 0),
            column(2, "Active", ColumnType::Boolean, 0),
            column(128, "Name", ColumnType::Text, CODEPAGE_WINDOWS_1252),
            column(129, "Blob", ColumnType::Binary, 0),
            column(256, "Notes", ColumnType::LongText, CODEPAGE_UTF16LE),
            column(257, "Payload", ColumnType::LongBinary, 0),
        ]
    }

    #[test]
    fn test_decode_fixed_and_null_bitmap() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let record = RecordBuilder::new(false)
            .fixed(1, &7i32.to_le_bytes())
            .fixed(2, &[1])
            .build();
        let decoded = decoder.decode(&record).unwrap();

        let raw = decoded.raw(0).unwrap().unwrap();
        assert_eq!(raw.storage, ValueStorage::Fixed);
        assert_eq!(
            decoder.typed_value(&columns[0], raw).unwrap(),
            Value::Long(7)
        );
        let raw = decoded.raw(1).unwrap().unwrap();
        assert_eq!(
            decoder.typed_value(&columns[1], raw).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_fixed_null_bit_clear_means_absent() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        // Only column 1 present; column 2's width is still consumed but its
        // presence bit stays clear.
        let mut record = RecordBuilder::new(false)
            .fixed(1, &7i32.to_le_bytes())
            .fixed(2, &[0xCC])
            .build();
        // Clear column 2's presence bit in the bitmap (after 5 data bytes).
        record[SIZE_RECORD_HEADER + 5] &= !0x02;
        let decoded = decoder.decode(&record).unwrap();
        assert!(decoded.raw(0).unwrap().is_some());
        assert!(decoded.raw(1).unwrap().is_none());
    }

    #[test]
    fn test_decode_variable_columns() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let record = RecordBuilder::new(false)
            .variable(128, Some(b"alice"))
            .variable(129, Some(b"\x01\x02"))
            .build();
        let decoded = decoder.decode(&record).unwrap();

        let raw = decoded.raw(2).unwrap().unwrap();
        assert_eq!(raw.storage, ValueStorage::Variable);
        assert_eq!(
            decoder.typed_value(&columns[2], raw).unwrap(),
            Value::Text("alice".into())
        );
        let raw = decoded.raw(3).unwrap().unwrap();
        assert_eq!(
            decoder.typed_value(&columns[3], raw).unwrap(),
            Value::Binary(vec![1, 2])
        );
    }

    #[test]
    fn test_variable_empty_slot() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let record = RecordBuilder::new(false)
            .variable(128, None)
            .variable(129, Some(b"xy"))
            .build();
        let decoded = decoder.decode(&record).unwrap();
        assert!(decoded.raw(2).unwrap().is_none());
        assert_eq!(decoded.raw(3).unwrap().unwrap().data, b"xy");
    }

    #[test]
    fn test_decode_tagged_old_format() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let notes: Vec<u8> = "hi".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let record = RecordBuilder::new(false)
            .tagged(256, 0, &notes)
            .tagged(257, VALUE_FLAG_LONG_VALUE, &42u32.to_le_bytes())
            .build();
        let decoded = decoder.decode(&record).unwrap();

        let raw = decoded.raw(4).unwrap().unwrap();
        assert_eq!(raw.storage, ValueStorage::Tagged);
        assert_eq!(
            decoder.typed_value(&columns[4], raw).unwrap(),
            Value::Text("hi".into())
        );
        let raw = decoded.raw(5).unwrap().unwrap();
        assert!(raw.is_long_value());
        assert_eq!(
            decoder.typed_value(&columns[5], raw).unwrap(),
            Value::LongValueRef(42)
        );
    }

    #[test]
    fn test_decode_tagged_new_format_flags_byte() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, true, DateTimeRepr::OleDouble);
        let record = RecordBuilder::new(true)
            .tagged(257, VALUE_FLAG_LONG_VALUE, &9u32.to_le_bytes())
            .build();
        let decoded = decoder.decode(&record).unwrap();
        let raw = decoded.raw(5).unwrap().unwrap();
        assert!(raw.is_long_value());
        assert_eq!(LittleEndian::read_u32(&raw.data), 9);
    }

    #[test]
    fn test_tagged_out_of_order_rejected() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let mut record = RecordBuilder::new(false)
            .tagged(256, 0, b"a")
            .tagged(257, 0, b"b")
            .build();
        // Swap the two entry identifiers.
        let tagged = record.len() - 10;
        record.swap(tagged, tagged + 4);
        record.swap(tagged + 1, tagged + 5);
        assert!(decoder.decode(&record).is_err());
    }

    #[test]
    fn test_multi_value_flag_routes_to_handle() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let payload = [0x04u8, 0x00, 0x05, 0x00, b'A', b'B'];
        let record = RecordBuilder::new(false)
            .tagged(256, VALUE_FLAG_MULTI_VALUE, &payload)
            .build();
        let decoded = decoder.decode(&record).unwrap();
        let raw = decoded.raw(4).unwrap().unwrap();
        assert!(raw.is_multi_value());
        assert_eq!(
            decoder.typed_value(&columns[4], raw).unwrap(),
            Value::MultiValue(payload.to_vec())
        );
    }

    #[test]
    fn test_reserved_flag_with_multi_value_yields_raw() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let payload = [0x02u8, b'A', b'B'];
        let record = RecordBuilder::new(false)
            .tagged(
                256,
                VALUE_FLAG_MULTI_VALUE | VALUE_FLAG_RESERVED_0X10,
                &payload,
            )
            .build();
        let decoded = decoder.decode(&record).unwrap();
        let raw = decoded.raw(4).unwrap().unwrap();
        assert_eq!(
            decoder.typed_value(&columns[4], raw).unwrap(),
            Value::Raw(payload.to_vec())
        );
    }

    #[test]
    fn test_compressed_tagged_text() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        // "RE:  (..." corpus blob; decompresses to 7-bit ASCII.
        let compressed = crate::ese::compression::tests_support::SEVEN_BIT_ASCII;
        let record = RecordBuilder::new(false)
            .tagged(256, VALUE_FLAG_COMPRESSED, &compressed)
            .build();
        let decoded = decoder.decode(&record).unwrap();
        let raw = decoded.raw(4).unwrap().unwrap();
        match decoder.typed_value(&columns[4], raw).unwrap() {
            Value::Text(text) => assert!(text.starts_with("RE:  (/Archiefmappen")),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_datetime_representations() {
        let mut col = column(3, "When", ColumnType::DateTime, 0);
        let columns = vec![col.clone()];
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);

        let record = RecordBuilder::new(false)
            .fixed(3, &44000.5f64.to_le_bytes())
            .build();
        let decoded = decoder.decode(&record).unwrap();
        let raw = decoded.raw(0).unwrap().unwrap();
        assert_eq!(
            decoder.typed_value(&columns[0], raw).unwrap(),
            Value::OleDateTime(44000.5)
        );

        col.date_time_repr = Some(DateTimeRepr::Filetime);
        let ticks = 132_500_000_000_000_000u64;
        let columns = vec![col];
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let record = RecordBuilder::new(false)
            .fixed(3, &ticks.to_le_bytes())
            .build();
        let decoded = decoder.decode(&record).unwrap();
        let raw = decoded.raw(0).unwrap().unwrap();
        assert_eq!(
            decoder.typed_value(&columns[0], raw).unwrap(),
            Value::Filetime(ticks)
        );
    }

    #[test]
    fn test_boolean_any_nonzero_is_true() {
        let columns = vec![column(1, "Flag", ColumnType::Boolean, 0)];
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        for byte in [1u8, 2, 0x7f, 0xff] {
            let record = RecordBuilder::new(false).fixed(1, &[byte]).build();
            let decoded = decoder.decode(&record).unwrap();
            let raw = decoded.raw(0).unwrap().unwrap();
            assert_eq!(
                decoder.typed_value(&columns[0], raw).unwrap(),
                Value::Boolean(true)
            );
        }
    }

    #[test]
    fn test_record_too_short_rejected() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        assert!(decoder.decode(&[1, 2]).is_err());
    }

    #[test]
    fn test_variable_offset_past_record_rejected() {
        let columns = decoder_columns();
        let decoder = RecordDecoder::new(&columns, false, DateTimeRepr::OleDouble);
        let record = [0u8, 127, 0xff, 0x7f];
        assert!(decoder.decode(&record).is_err());
    }
}

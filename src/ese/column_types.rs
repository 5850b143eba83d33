//! ESE column type definitions.
//!
//! Maps the catalog's column-type word to a [`ColumnType`] enum. Each variant
//! carries its JET source name and, for the fixed storage class, its on-disk
//! width. Types 0-8 date back to the original engine; 9-13 are the variable
//! and large storage classes; 14-17 were added later for unsigned and wide
//! integers and GUIDs.

use serde::Serialize;
use std::fmt;

/// All ESE column types.
///
/// Values match the `JET_coltyp` constants of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnType {
    /// Invalid / no type (JET_coltypNil = 0)
    Null,
    /// Single byte, 0 is false, anything else true (JET_coltypBit = 1)
    Boolean,
    /// Unsigned 8-bit integer (JET_coltypUnsignedByte = 2)
    UnsignedByte,
    /// Signed 16-bit integer (JET_coltypShort = 3)
    Short,
    /// Signed 32-bit integer (JET_coltypLong = 4)
    Long,
    /// Signed 64-bit integer, "currency" (JET_coltypCurrency = 5)
    Currency,
    /// 32-bit IEEE float (JET_coltypIEEESingle = 6)
    IeeeSingle,
    /// 64-bit IEEE double (JET_coltypIEEEDouble = 7)
    IeeeDouble,
    /// 64-bit date-time, OLE automation date or FILETIME (JET_coltypDateTime = 8)
    DateTime,
    /// Variable-size binary (JET_coltypBinary = 9)
    Binary,
    /// Variable-size, codepage-tagged text (JET_coltypText = 10)
    Text,
    /// Large binary, possibly stored out of row (JET_coltypLongBinary = 11)
    LongBinary,
    /// Large text, possibly stored out of row (JET_coltypLongText = 12)
    LongText,
    /// Super-large value (JET_coltypSLV = 13, obsolete)
    SuperLarge,
    /// Unsigned 32-bit integer (JET_coltypUnsignedLong = 14)
    UnsignedLong,
    /// Signed 64-bit integer (JET_coltypLongLong = 15)
    LongLong,
    /// 16-byte GUID (JET_coltypGUID = 16)
    Guid,
    /// Unsigned 16-bit integer (JET_coltypUnsignedShort = 17)
    UnsignedShort,
}

impl ColumnType {
    /// Convert the catalog's column-type word.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ColumnType::Null),
            1 => Some(ColumnType::Boolean),
            2 => Some(ColumnType::UnsignedByte),
            3 => Some(ColumnType::Short),
            4 => Some(ColumnType::Long),
            5 => Some(ColumnType::Currency),
            6 => Some(ColumnType::IeeeSingle),
            7 => Some(ColumnType::IeeeDouble),
            8 => Some(ColumnType::DateTime),
            9 => Some(ColumnType::Binary),
            10 => Some(ColumnType::Text),
            11 => Some(ColumnType::LongBinary),
            12 => Some(ColumnType::LongText),
            13 => Some(ColumnType::SuperLarge),
            14 => Some(ColumnType::UnsignedLong),
            15 => Some(ColumnType::LongLong),
            16 => Some(ColumnType::Guid),
            17 => Some(ColumnType::UnsignedShort),
            _ => None,
        }
    }

    /// The on-disk width of a fixed-storage value of this type, or `None`
    /// for the variable storage classes.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            ColumnType::Null => Some(0),
            ColumnType::Boolean | ColumnType::UnsignedByte => Some(1),
            ColumnType::Short | ColumnType::UnsignedShort => Some(2),
            ColumnType::Long | ColumnType::UnsignedLong | ColumnType::IeeeSingle => Some(4),
            ColumnType::Currency
            | ColumnType::IeeeDouble
            | ColumnType::DateTime
            | ColumnType::LongLong => Some(8),
            ColumnType::Guid => Some(16),
            ColumnType::Binary
            | ColumnType::Text
            | ColumnType::LongBinary
            | ColumnType::LongText
            | ColumnType::SuperLarge => None,
        }
    }

    /// Returns true for the two text types.
    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::LongText)
    }

    /// Returns true for types that may be stored in the long-value tree.
    pub fn is_large(&self) -> bool {
        matches!(
            self,
            ColumnType::LongBinary | ColumnType::LongText | ColumnType::SuperLarge
        )
    }

    /// The JET source name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Null => "JET_coltypNil",
            ColumnType::Boolean => "JET_coltypBit",
            ColumnType::UnsignedByte => "JET_coltypUnsignedByte",
            ColumnType::Short => "JET_coltypShort",
            ColumnType::Long => "JET_coltypLong",
            ColumnType::Currency => "JET_coltypCurrency",
            ColumnType::IeeeSingle => "JET_coltypIEEESingle",
            ColumnType::IeeeDouble => "JET_coltypIEEEDouble",
            ColumnType::DateTime => "JET_coltypDateTime",
            ColumnType::Binary => "JET_coltypBinary",
            ColumnType::Text => "JET_coltypText",
            ColumnType::LongBinary => "JET_coltypLongBinary",
            ColumnType::LongText => "JET_coltypLongText",
            ColumnType::SuperLarge => "JET_coltypSLV",
            ColumnType::UnsignedLong => "JET_coltypUnsignedLong",
            ColumnType::LongLong => "JET_coltypLongLong",
            ColumnType::Guid => "JET_coltypGUID",
            ColumnType::UnsignedShort => "JET_coltypUnsignedShort",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

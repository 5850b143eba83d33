//! Column-value decompression: 7-bit packed text and LZXPRESS.
//!
//! Compressed values announce their scheme in the first byte:
//!
//! - high nibble `0x0`: 7-bit packed UTF-16LE text
//! - high nibble `0x1` (except `0x18`): 7-bit packed ASCII text
//! - exactly `0x18`: LZXPRESS, followed by the 16-bit uncompressed size
//!
//! The 7-bit scheme packs seven payload bits per unit into a little-endian
//! bit stream. In the ASCII flavor every unit is one byte of output; in the
//! UTF-16 flavor consecutive unit pairs form one little-endian code unit.
//! Decoding is strict: leftover bits past the last unit must be zero and the
//! UTF-16 flavor must not end on a half code unit.
//!
//! LZXPRESS is an LZ77 derivative: 32-bit control words, consumed from the
//! most significant bit, select literal copy (0) or back-reference (1).
//! A back-reference packs distance-minus-1 into the high 13 bits of a 16-bit
//! word and length-minus-3 into the low 3, with escalating escape encodings
//! (shared nibble, extra byte, 16-bit replacement) for longer matches. Every
//! copy is bounds-checked against the declared output size.

use byteorder::{ByteOrder, LittleEndian};

use crate::EseError;

/// Compression scheme of a value, from its leading byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// 7-bit packed ASCII.
    SevenBitAscii,
    /// 7-bit packed UTF-16LE.
    SevenBitUtf16,
    /// LZXPRESS.
    Lzxpress,
}

/// Identify the compression scheme from the value's first byte.
pub fn compression_kind(data: &[u8]) -> Result<CompressionKind, EseError> {
    let lead = *data
        .first()
        .ok_or_else(|| EseError::Decompression("Empty compressed value".into()))?;
    if lead == 0x18 {
        Ok(CompressionKind::Lzxpress)
    } else if lead & 0xf0 == 0x10 {
        Ok(CompressionKind::SevenBitAscii)
    } else if lead & 0xf0 == 0x00 {
        Ok(CompressionKind::SevenBitUtf16)
    } else {
        Err(EseError::Decompression(format!(
            "Unsupported compression leading byte {:#04x}",
            lead
        )))
    }
}

/// Decompress a value, dispatching on its leading byte.
///
/// 7-bit ASCII yields one byte per unit; 7-bit UTF-16 yields a UTF-16LE byte
/// stream; LZXPRESS yields the declared number of bytes.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, EseError> {
    match compression_kind(data)? {
        CompressionKind::Lzxpress => decompress_lzxpress(data),
        CompressionKind::SevenBitAscii | CompressionKind::SevenBitUtf16 => decompress_7bit(data),
    }
}

/// Size in bytes of the decompressed form of `data`, without decompressing
/// the 7-bit flavors.
pub fn decompressed_size(data: &[u8]) -> Result<usize, EseError> {
    match compression_kind(data)? {
        CompressionKind::Lzxpress => {
            if data.len() < 3 {
                return Err(EseError::Decompression(
                    "LZXPRESS value shorter than its header".into(),
                ));
            }
            Ok(LittleEndian::read_u16(&data[1..]) as usize)
        }
        // Each 7-bit unit becomes one output byte in both flavors.
        CompressionKind::SevenBitAscii | CompressionKind::SevenBitUtf16 => {
            Ok((data.len() - 1) * 8 / 7)
        }
    }
}

/// Decompress a 7-bit packed value.
///
/// The leading scheme byte selects the flavor. Returns raw decoded bytes:
/// ASCII output is one byte per unit, UTF-16 output is little-endian code
/// units (use [`decompress_7bit_to_utf8`] for a `String`).
pub fn decompress_7bit(data: &[u8]) -> Result<Vec<u8>, EseError> {
    let kind = compression_kind(data)?;
    let is_ascii = match kind {
        CompressionKind::SevenBitAscii => true,
        CompressionKind::SevenBitUtf16 => false,
        CompressionKind::Lzxpress => {
            return Err(EseError::Decompression(
                "LZXPRESS value passed to the 7-bit decoder".into(),
            ))
        }
    };

    let mut units = Vec::with_capacity((data.len() - 1) * 8 / 7);
    let mut accumulator: u16 = 0;
    let mut bits: u8 = 0;

    for &byte in &data[1..] {
        accumulator |= (byte as u16) << bits;
        bits += 8;
        while bits >= 7 {
            units.push((accumulator & 0x7f) as u8);
            accumulator >>= 7;
            bits -= 7;
        }
    }

    if accumulator != 0 {
        return Err(EseError::Decompression(format!(
            "7-bit stream has a non-zero remainder {:#x}",
            accumulator
        )));
    }

    if is_ascii {
        Ok(units)
    } else {
        if units.len() % 2 != 0 {
            return Err(EseError::Decompression(
                "7-bit UTF-16 stream ends on a half code unit".into(),
            ));
        }
        // Units pair into little-endian code units; emit them back as bytes.
        Ok(units)
    }
}

/// Decompress a 7-bit packed value into UTF-8.
///
/// Any packed NUL terminator is preserved in the output.
pub fn decompress_7bit_to_utf8(data: &[u8]) -> Result<String, EseError> {
    let kind = compression_kind(data)?;
    let units = decompress_7bit(data)?;
    match kind {
        CompressionKind::SevenBitAscii => {
            // Units are 7-bit, so this is always valid UTF-8.
            Ok(String::from_utf8(units)
                .map_err(|e| EseError::Decompression(format!("7-bit ASCII not UTF-8: {}", e)))?)
        }
        CompressionKind::SevenBitUtf16 => {
            let code_units: Vec<u16> = units
                .chunks_exact(2)
                .map(|pair| pair[0] as u16 | (pair[1] as u16) << 8)
                .collect();
            String::from_utf16(&code_units)
                .map_err(|e| EseError::Decompression(format!("7-bit UTF-16 invalid: {}", e)))
        }
        CompressionKind::Lzxpress => unreachable!("filtered by decompress_7bit"),
    }
}

/// Decompress an LZXPRESS value with its `[0x18][size:u16le]` prefix.
pub fn decompress_lzxpress(data: &[u8]) -> Result<Vec<u8>, EseError> {
    if data.len() < 3 || data[0] != 0x18 {
        return Err(EseError::Decompression(
            "LZXPRESS value missing its header".into(),
        ));
    }
    let uncompressed_size = LittleEndian::read_u16(&data[1..]) as usize;
    decompress_lzxpress_raw(&data[3..], uncompressed_size)
}

/// Decompress a bare LZXPRESS stream (no scheme byte or size prefix) to
/// exactly `uncompressed_size` bytes.
pub fn decompress_lzxpress_raw(
    stream: &[u8],
    uncompressed_size: usize,
) -> Result<Vec<u8>, EseError> {
    let mut output = Vec::with_capacity(uncompressed_size);
    let mut input = 0usize;
    let mut control: u32 = 0;
    let mut control_bits: u32 = 0;
    let mut shared_nibble: Option<usize> = None;

    while output.len() < uncompressed_size {
        if control_bits == 0 {
            if input + 4 > stream.len() {
                return Err(EseError::Decompression(
                    "LZXPRESS stream truncated in a control word".into(),
                ));
            }
            control = LittleEndian::read_u32(&stream[input..]);
            input += 4;
            control_bits = 32;
        }
        control_bits -= 1;

        if control & (1 << control_bits) == 0 {
            let byte = *stream.get(input).ok_or_else(|| {
                EseError::Decompression("LZXPRESS stream truncated in a literal".into())
            })?;
            input += 1;
            output.push(byte);
            continue;
        }

        if input + 2 > stream.len() {
            return Err(EseError::Decompression(
                "LZXPRESS stream truncated in a match word".into(),
            ));
        }
        let tuple = LittleEndian::read_u16(&stream[input..]);
        input += 2;
        let distance = (tuple >> 3) as usize + 1;
        let mut length = (tuple & 0x07) as usize;

        if length == 7 {
            length = match shared_nibble.take() {
                Some(index) => (stream[index] >> 4) as usize,
                None => {
                    let byte = *stream.get(input).ok_or_else(|| {
                        EseError::Decompression(
                            "LZXPRESS stream truncated in a length nibble".into(),
                        )
                    })?;
                    shared_nibble = Some(input);
                    input += 1;
                    (byte & 0x0f) as usize
                }
            };
            if length == 15 {
                let byte = *stream.get(input).ok_or_else(|| {
                    EseError::Decompression("LZXPRESS stream truncated in a length byte".into())
                })?;
                input += 1;
                length = byte as usize;
                if length == 255 {
                    if input + 2 > stream.len() {
                        return Err(EseError::Decompression(
                            "LZXPRESS stream truncated in a 16-bit length".into(),
                        ));
                    }
                    length = LittleEndian::read_u16(&stream[input..]) as usize;
                    input += 2;
                    if length < 15 + 7 {
                        return Err(EseError::Decompression(format!(
                            "LZXPRESS 16-bit match length {} below its floor",
                            length
                        )));
                    }
                    length -= 15 + 7;
                }
                length += 15;
            }
            length += 7;
        }
        length += 3;

        if distance > output.len() {
            return Err(EseError::Decompression(format!(
                "LZXPRESS match distance {} exceeds {} bytes of output",
                distance,
                output.len()
            )));
        }
        if output.len() + length > uncompressed_size {
            return Err(EseError::Decompression(format!(
                "LZXPRESS match of {} bytes overruns the declared size {}",
                length, uncompressed_size
            )));
        }
        for _ in 0..length {
            let byte = output[output.len() - distance];
            output.push(byte);
        }
    }

    Ok(output)
}

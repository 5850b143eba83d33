//! Hex dump formatting.
//!
//! Traditional hex dump output (offset column, two groups of eight hex
//! bytes, ASCII sidebar) used by the `dump` tool and for raw value display.

/// Format bytes as a compact hex string (e.g., "4a2f00ff").
pub fn format_bytes(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Produce a standard hex dump of `data`, offsets starting at `base_offset`.
///
/// Output format (16 bytes per line):
/// ```text
/// 00000000  xx xx xx xx xx xx xx xx  xx xx xx xx xx xx xx xx  |................|
/// ```
pub fn hex_dump(data: &[u8], base_offset: u64) -> String {
    let mut lines = Vec::new();

    for (line_index, chunk) in data.chunks(16).enumerate() {
        let offset = base_offset + (line_index * 16) as u64;
        let mut line = format!("{:08x}  ", offset);

        for column in 0..16 {
            if column == 8 {
                line.push(' ');
            }
            match chunk.get(column) {
                Some(byte) => line.push_str(&format!("{:02x} ", byte)),
                None => line.push_str("   "),
            }
        }

        line.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                line.push(*byte as char);
            } else {
                line.push('.');
            }
        }
        for _ in chunk.len()..16 {
            line.push(' ');
        }
        line.push('|');
        lines.push(line);
    }

    lines.join("\n")
}

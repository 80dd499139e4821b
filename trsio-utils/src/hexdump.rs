use std::fmt::Write;

/// Number of bytes shown on each dump line.
pub const BYTES_PER_LINE: usize = 16;

/// Format `buf` as an offset-prefixed hex dump, one line per 16 bytes:
///
/// ```text
/// 0000: 48 45 4C 4C 4F 00 00 00 00 00 00 00 00 00 00 00  HELLO...........
/// ```
///
/// A short final line is padded so the character column stays aligned.
pub fn hexdump(buf: &[u8]) -> String {
    let lines = (buf.len() + BYTES_PER_LINE - 1) / BYTES_PER_LINE;
    let mut out = String::with_capacity(lines * (6 + BYTES_PER_LINE * 4 + 2));

    for (line, chunk) in buf.chunks(BYTES_PER_LINE).enumerate() {
        if line != 0 {
            out.push('\n');
        }
        write!(out, "{:04X}:", line * BYTES_PER_LINE).unwrap();
        for byte in chunk {
            write!(out, " {:02X}", byte).unwrap();
        }
        for _ in chunk.len()..BYTES_PER_LINE {
            out.push_str("   ");
        }
        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| printable(b)));
    }

    out
}

/// Like `hexdump`, but collapses trailing all-zero lines into a single
/// summary line. Sector buffers are mostly padding, and logs get long.
pub fn hexdump_trimmed(buf: &[u8]) -> String {
    let used = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    // Round up to a whole line.
    let shown = ((used + BYTES_PER_LINE - 1) / BYTES_PER_LINE) * BYTES_PER_LINE;
    let shown = shown.min(buf.len());
    let mut out = hexdump(&buf[..shown]);
    if shown < buf.len() {
        if !out.is_empty() {
            out.push('\n');
        }
        write!(out, "{:04X}: 00 x {}", shown, buf.len() - shown).unwrap();
    }
    out
}

fn printable(byte: u8) -> char {
    match byte {
        0x20..=0x7E => byte.into(),
        _ => '.',
    }
}

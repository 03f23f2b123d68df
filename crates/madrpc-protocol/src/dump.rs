//! Hex dumps of raw datagrams for high debug levels.

use std::fmt::Write;

/// Formats `bytes` as rows of 16 bytes, grouped in 4-byte words.
pub fn hex_dump(title: &str, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(title.len() + bytes.len() * 3);
    out.push_str(title);
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let words: Vec<String> = chunk.chunks(4).map(hex::encode).collect();
        let _ = write!(out, "\n{:04x}: {}", row * 16, words.join(" "));
    }
    out
}

use crate::errors::{IndexError, Result};

pub fn convert_hex_string_to_u64(hex_string: &str) -> Result<u64> {
    u64::from_str_radix(hex_string.trim_start_matches("0x"), 16)
        .map_err(|_| IndexError::invalid_hex(hex_string))
}

/// Splits hex text into consecutive 64-character words after skipping `skip` characters.
/// A trailing partial word is ignored.
pub fn hex_words(data: &str, skip: usize) -> impl Iterator<Item = &str> {
    let body = data.get(skip..).unwrap_or("");
    let count = if body.is_ascii() { body.len() / 64 } else { 0 };
    (0..count).map(move |i| &body[i * 64..(i + 1) * 64])
}

//! Script checksums.

const BOM: char = '\u{feff}';

/// Checksum of a script's text.
///
/// Line endings are normalized and a leading byte order mark is dropped, so
/// the same script checked out on different platforms yields the same value.
pub fn checksum(text: &str) -> i32 {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut hasher = blake3::Hasher::new();
    for line in text.lines() {
        hasher.update(line.trim_end_matches('\r').as_bytes());
        hasher.update(b"\n");
    }
    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

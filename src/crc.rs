//! CRC-32 wrapper, used only to verify stored block integrity (§4.A, §8.3).

/// CRC-32 (zlib-equivalent polynomial) over a buffer.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

use std::io::{Cursor, Read};
use zstd::stream::{encode_all, read::Decoder};

/// Compress a checksum payload using zstd
pub fn zstd_compress(input: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    encode_all(Cursor::new(input), level)
}

/// Decompress a checksum payload, refusing to inflate past `limit` bytes
pub fn zstd_decompress(input: &[u8], limit: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    Decoder::new(Cursor::new(input))?
        .take(limit as u64 + 1)
        .read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decompressed payload exceeds {} bytes", limit),
        ));
    }
    Ok(out)
}

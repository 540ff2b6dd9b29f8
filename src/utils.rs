use sha1::{Digest, Sha1};

/// Extracts a 32-bit unsigned integer from a buffer at a given offset.
///
/// # Panics
///
/// Panics if the slice does not contain enough bytes starting from the offset.
pub fn u32_at(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(
        buffer[offset..offset + 4]
            .try_into()
            .expect("invalid slice"),
    )
}

/// Lower-case hexadecimal SHA-1 digest of `data` (40 characters).
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Makes a recovered name safe to use as a file name inside an output directory.
///
/// Path separators and control characters are replaced and names that would escape the directory
/// (`.`, `..`, empty) get a fallback.
pub fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.trim() {
        "" | "." | ".." => fallback.to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_known_input() {
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn little_endian_reads() {
        let buf = [0x78, 0x56, 0x34, 0x12];
        assert_eq!(u32_at(&buf, 0), 0x1234_5678);
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("a/b.bmp", "x"), "a_b.bmp");
        assert_eq!(sanitize_file_name("..", "x"), "x");
        assert_eq!(sanitize_file_name("", "x"), "x");
        assert_eq!(sanitize_file_name("_.BMP", "x"), "_.BMP");
    }
}

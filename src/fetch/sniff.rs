//! Image format sniffing by magic bytes.
//!
//! The upstream Content-Type is ignored entirely; whatever the first bytes
//! say is what gets served. Misconfigured origins routinely label PNGs as
//! `text/html` or worse.

/// Bytes buffered before deciding on a format.
pub const SNIFF_LIMIT: usize = 1024;

/// Identify a supported raster format from the leading bytes.
///
/// Recognizes PNG, GIF, BMP and JPEG, plus the legacy variant with a `PNG`
/// signature at offset 1. Returns `None` when nothing matches.
pub fn sniff(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    if data.starts_with(&[0x47, 0x49, 0x46, 0x38]) {
        return Some("image/gif");
    }
    if data.starts_with(&[0x42, 0x4D]) {
        return Some("image/bmp");
    }
    if data.starts_with(&[0xFF, 0xD8]) {
        return Some("image/jpeg");
    }
    // Some ancient encoders prepend a stray byte before the PNG signature
    if data.len() >= 4 && &data[1..4] == b"PNG" {
        return Some("image/png");
    }
    None
}

//! Content type detection for cached image bytes
//!
//! The cache stores raw bytes only, so the content type is recovered from the
//! payload's magic number.

const OCTET_STREAM: &str = "application/octet-stream";

pub fn sniff_content_type(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        OCTET_STREAM
    }
}

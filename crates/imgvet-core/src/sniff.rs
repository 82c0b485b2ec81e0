//! Server-side content sniffing.
//!
//! Inspects actual bytes against known magic numbers, independent of any
//! client-declared Content-Type header, so that a spoofed header never gets
//! an artifact past ingest.

/// PNG: fixed 8-byte signature.
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Sniffed media type, by magic number only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedType {
    Png,
    Jpeg,
}

impl SniffedType {
    pub fn mime(&self) -> &'static str {
        match self {
            SniffedType::Png => "image/png",
            SniffedType::Jpeg => "image/jpeg",
        }
    }
}

/// True when the buffer starts with the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
    data.len() >= PNG_SIGNATURE.len() && data[..PNG_SIGNATURE.len()] == PNG_SIGNATURE
}

/// True when the buffer starts `FF D8` and ends `FF D9` (JPEG SOI/EOI).
pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 4
        && data[0] == 0xFF
        && data[1] == 0xD8
        && data[data.len() - 2] == 0xFF
        && data[data.len() - 1] == 0xD9
}

/// Classify the buffer by magic number, or `None` when it is neither PNG nor
/// JPEG.
pub fn detect(data: &[u8]) -> Option<SniffedType> {
    if is_png(data) {
        Some(SniffedType::Png)
    } else if is_jpeg(data) {
        Some(SniffedType::Jpeg)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
        data
    }

    fn jpeg_bytes() -> Vec<u8> {
        vec![0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]
    }

    #[test]
    fn png_signature_detected() {
        assert!(is_png(&png_bytes()));
        assert_eq!(detect(&png_bytes()), Some(SniffedType::Png));
    }

    #[test]
    fn jpeg_signature_detected() {
        assert!(is_jpeg(&jpeg_bytes()));
        assert_eq!(detect(&jpeg_bytes()), Some(SniffedType::Jpeg));
    }

    #[test]
    fn detection_is_independent_of_declared_type() {
        // The detectors only ever see bytes; a buffer with a PNG signature is
        // PNG no matter what a header claimed.
        let data = png_bytes();
        assert!(is_png(&data));
        assert!(!is_jpeg(&data));
    }

    #[test]
    fn arbitrary_bytes_match_neither() {
        for data in [
            &b""[..],
            &b"GIF89a"[..],
            &b"<html></html>"[..],
            &[0x4D, 0x5A, 0x90, 0x00][..], // PE header
        ] {
            assert!(!is_png(data));
            assert!(!is_jpeg(data));
            assert_eq!(detect(data), None);
        }
    }

    #[test]
    fn truncated_signatures_rejected() {
        assert!(!is_png(&PNG_SIGNATURE[..7]));
        // SOI without EOI
        assert!(!is_jpeg(&[0xFF, 0xD8, 0x00, 0x00]));
        // EOI without SOI
        assert!(!is_jpeg(&[0x00, 0x00, 0xFF, 0xD9]));
    }

    #[test]
    fn sniffed_type_mime() {
        assert_eq!(SniffedType::Png.mime(), "image/png");
        assert_eq!(SniffedType::Jpeg.mime(), "image/jpeg");
    }
}

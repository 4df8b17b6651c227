//! Stamp image byte utilities - format sniffing and decode

use image::RgbaImage;

/// Image encodings accepted for stamp artwork.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StampFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl StampFormat {
    /// MIME type for the format
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    #[must_use]
    pub const fn as_image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Gif => image::ImageFormat::Gif,
            Self::Webp => image::ImageFormat::WebP,
        }
    }
}

/// Identify a stamp image encoding from its magic bytes.
#[must_use]
pub fn sniff_format(bytes: &[u8]) -> Option<StampFormat> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(StampFormat::Png);
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(StampFormat::Jpeg);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(StampFormat::Gif);
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(StampFormat::Webp);
    }
    None
}

/// Pixel dimensions of an encoded image without a full decode.
#[must_use]
pub fn natural_size(bytes: &[u8]) -> Option<(u32, u32)> {
    let size = imagesize::blob_size(bytes).ok()?;
    Some((size.width as u32, size.height as u32))
}

/// Decode stamp bytes into an RGBA buffer ready for compositing.
///
/// Sniffed format is preferred; unrecognized magic bytes fall back to the
/// decoder's own detection so that a sniffing gap does not reject an image
/// the decoder could still handle.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, image::ImageError> {
    let decoded = match sniff_format(bytes) {
        Some(format) => image::load_from_memory_with_format(bytes, format.as_image_format())?,
        None => image::load_from_memory(bytes)?,
    };
    Ok(decoded.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("png encode");
        out.into_inner()
    }

    #[test]
    fn sniffs_png_magic() {
        assert_eq!(sniff_format(&png_bytes()), Some(StampFormat::Png));
    }

    #[test]
    fn sniffs_jpeg_and_gif_magic() {
        assert_eq!(
            sniff_format(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]),
            Some(StampFormat::Jpeg)
        );
        assert_eq!(sniff_format(b"GIF89a-rest"), Some(StampFormat::Gif));
    }

    #[test]
    fn sniffs_webp_riff_container() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"WEBP");
        assert_eq!(sniff_format(&bytes), Some(StampFormat::Webp));
    }

    #[test]
    fn rejects_unknown_bytes() {
        assert_eq!(sniff_format(b"%PDF-1.7"), None);
        assert_eq!(sniff_format(&[]), None);
    }

    #[test]
    fn natural_size_reads_header_only() {
        assert_eq!(natural_size(&png_bytes()), Some((3, 2)));
        assert_eq!(natural_size(b"not an image"), None);
    }

    #[test]
    fn decode_round_trips_pixels() {
        let rgba = decode_rgba(&png_bytes()).expect("decode");
        assert_eq!(rgba.dimensions(), (3, 2));
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_rgba(b"definitely not an image").is_err());
    }
}

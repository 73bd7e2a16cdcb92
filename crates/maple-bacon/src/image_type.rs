//! Image container sniffing.

use bytes::Bytes;

use crate::convert::DataConvertible;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Image formats recognised from their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Jpeg,
    Png,
}

impl ImageType {
    /// Detect the format of `data`, or `None` if it is not a supported image
    pub fn from_data(data: &[u8]) -> Option<Self> {
        if data.starts_with(JPEG_MAGIC) {
            Some(ImageType::Jpeg)
        } else if data.starts_with(PNG_MAGIC) {
            Some(ImageType::Png)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpg",
            ImageType::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
        }
    }
}

/// Encoded image bytes whose format has been verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: Bytes,
    pub image_type: ImageType,
}

impl DataConvertible for EncodedImage {
    fn decode(data: &[u8]) -> Option<Self> {
        let image_type = ImageType::from_data(data)?;
        Some(Self {
            data: Bytes::copy_from_slice(data),
            image_type,
        })
    }

    fn encode(&self) -> Option<Bytes> {
        Some(self.data.clone())
    }

    fn cost(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_jpeg() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        assert_eq!(ImageType::from_data(&data), Some(ImageType::Jpeg));
        assert_eq!(ImageType::Jpeg.extension(), "jpg");
    }

    #[test]
    fn test_detects_png() {
        let data = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert_eq!(ImageType::from_data(&data), Some(ImageType::Png));
        assert_eq!(ImageType::Png.mime_type(), "image/png");
    }

    #[test]
    fn test_tiff_is_not_supported() {
        assert_eq!(ImageType::from_data(b"II*\x00\x08\x00\x00\x00"), None);
        assert_eq!(ImageType::from_data(b"MM\x00*"), None);
        assert_eq!(ImageType::from_data(&[]), None);
    }

    #[test]
    fn test_encoded_image_rejects_unknown_data() {
        assert!(EncodedImage::decode(b"<html>").is_none());
        let png = EncodedImage::decode(b"\x89PNG\r\n\x1a\nrest").unwrap();
        assert_eq!(png.image_type, ImageType::Png);
        assert_eq!(png.encode(), Some(png.data.clone()));
    }
}

//! Image decode/re-encode helpers backing flow B's `image-metadata` and
//! `change-image-type` commands. Generalizes the EXIF-stripping
//! decode-reencode pipeline the teacher's upload handler used inline
//! (`image::ImageReader` → `into_decoder` → `apply_orientation` →
//! `DynamicImage::write_to`) into two small, independently testable
//! steps.

use crate::error::{AppError, Result};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

/// A decoded image plus the dimensions and format it carried before
/// re-encoding, since `image-metadata` reports on the content as
/// uploaded.
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Decodes `content`, applying any EXIF orientation so `width`/`height`
/// and any subsequent re-encode reflect the image as it should be
/// displayed. `FileInvalidContent` on anything that fails to decode.
pub fn decode(content: &[u8]) -> Result<DecodedImage> {
    let reader = ImageReader::new(Cursor::new(content))
        .with_guessed_format()
        .map_err(|e| AppError::FileInvalidContent(e.to_string()))?;
    let format = reader.format().ok_or_else(|| AppError::FileInvalidContent("unrecognized image format".into()))?;

    let mut decoder = reader.into_decoder().map_err(|e| AppError::FileInvalidContent(e.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut image = DynamicImage::from_decoder(decoder).map_err(|e| AppError::FileInvalidContent(e.to_string()))?;
    image.apply_orientation(orientation);

    let (width, height) = (image.width(), image.height());
    Ok(DecodedImage { image, format, width, height })
}

/// Re-encodes `image` as `format`, the way the teacher's upload handler
/// re-encodes to strip EXIF data, generalized to an arbitrary target
/// format rather than always the source format.
pub fn reencode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|e| AppError::server("reencode-image", e))?;
    Ok(bytes)
}

/// Maps the `metadata` string a `change-image-type` command names
/// (e.g. `"image/png"`) onto an [`ImageFormat`] this crate can encode
/// to. Unsupported targets are a request error, not a server error.
pub fn format_from_mime(mime_type: &str) -> Result<ImageFormat> {
    match mime_type {
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/png" => Ok(ImageFormat::Png),
        _ => Err(AppError::RequestInvalid(format!("unsupported target image type: {mime_type}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let image = DynamicImage::new_rgb8(w, h);
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn decodes_dimensions_from_a_generated_png() {
        let bytes = png_bytes(4, 3);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!((decoded.width, decoded.height), (4, 3));
    }

    #[test]
    fn rejects_garbage_as_invalid_content() {
        let err = decode(b"not an image").unwrap_err();
        assert!(matches!(err, AppError::FileInvalidContent(_)));
    }

    #[test]
    fn reencodes_png_as_jpeg_and_back() {
        let bytes = png_bytes(2, 2);
        let decoded = decode(&bytes).unwrap();
        let jpeg = reencode(&decoded.image, ImageFormat::Jpeg).unwrap();
        let redecoded = decode(&jpeg).unwrap();
        assert_eq!(redecoded.format, ImageFormat::Jpeg);
        assert_eq!((redecoded.width, redecoded.height), (2, 2));
    }

    #[test]
    fn maps_supported_mime_types_to_formats() {
        assert_eq!(format_from_mime("image/png").unwrap(), ImageFormat::Png);
        assert_eq!(format_from_mime("image/jpeg").unwrap(), ImageFormat::Jpeg);
        assert!(format_from_mime("image/gif").is_err());
    }
}

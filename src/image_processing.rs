use std::io::Cursor;

use image::{
    DynamicImage, ImageDecoder, ImageFormat, ImageReader, codecs::jpeg::JpegEncoder,
    imageops::FilterType,
};
use tracing::debug;

use crate::error::ImageError;

pub const DEFAULT_MAX_DIMENSION: u32 = 1080;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const JPEG_MIME: &str = "image/jpeg";

/// Upload-ready image bytes plus what the key and content type need.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
    pub passthrough: bool,
}

/// Resizes and re-encodes picked images as JPEG before upload.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    max_dimension: u32,
    jpeg_quality: u8,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION, DEFAULT_JPEG_QUALITY)
    }
}

impl ImageNormalizer {
    pub fn new(max_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Animated sources are returned unmodified; everything else is decoded,
    /// oriented, shrunk to fit `max_dimension` and encoded as JPEG.
    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedImage, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let mime_type = detect_mime_type(bytes)
            .ok_or_else(|| ImageError::UnsupportedFormat("unknown".to_string()))?;

        if is_animated(bytes, mime_type) {
            let (width, height) = get_dimensions(bytes, mime_type).unwrap_or((0, 0));
            debug!(mime_type, size = bytes.len(), "passing animated image through");
            return Ok(NormalizedImage {
                bytes: bytes.to_vec(),
                mime_type,
                extension: get_extension_from_mime_type(mime_type),
                width,
                height,
                passthrough: true,
            });
        }

        let image = decode_oriented(bytes, mime_type)?;
        let resized = resize_to_fit(image, self.max_dimension);
        let (width, height) = (resized.width(), resized.height());
        let encoded = encode_jpeg(&resized, self.jpeg_quality)?;
        debug!(
            source_mime = mime_type,
            source_size = bytes.len(),
            width,
            height,
            size = encoded.len(),
            "normalized image"
        );
        Ok(NormalizedImage {
            bytes: encoded,
            mime_type: JPEG_MIME,
            extension: "jpg",
            width,
            height,
            passthrough: false,
        })
    }
}

fn decode_oriented(bytes: &[u8], mime_type: &str) -> Result<DynamicImage, ImageError> {
    let format = mime_to_format(mime_type)?;
    let mut decoder = ImageReader::with_format(Cursor::new(bytes), format)
        .into_decoder()
        .map_err(ImageError::Decode)?;
    let orientation = decoder.orientation().map_err(ImageError::Decode)?;
    let mut image = DynamicImage::from_decoder(decoder).map_err(ImageError::Decode)?;
    image.apply_orientation(orientation);
    Ok(image)
}

fn resize_to_fit(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut output = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut output, quality))
        .map_err(ImageError::Encode)?;
    Ok(output)
}

fn is_animated(bytes: &[u8], mime_type: &str) -> bool {
    match mime_type {
        "image/gif" => true,
        // VP8X header with the animation flag set.
        "image/webp" => {
            bytes.len() >= 21 && &bytes[12..16] == b"VP8X" && bytes[20] & 0x02 != 0
        }
        _ => false,
    }
}

pub fn get_dimensions(bytes: &[u8], mime_type: &str) -> Result<(u32, u32), ImageError> {
    let format = mime_to_format(mime_type)?;
    let reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.into_dimensions().map_err(ImageError::Decode)
}

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(JPEG_MIME);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}

pub fn mime_to_format(mime_type: &str) -> Result<ImageFormat, ImageError> {
    match mime_type {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/webp" => Ok(ImageFormat::WebP),
        "image/bmp" => Ok(ImageFormat::Bmp),
        _ => Err(ImageError::UnsupportedFormat(mime_type.to_string())),
    }
}

pub fn get_extension_from_mime_type(mime_type: &str) -> &'static str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}

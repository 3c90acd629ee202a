use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, GenericImageView};
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::types::ImageMime;
use crate::llm::media::detect_mime_type;

pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image too large. Max size is {max_mb}MB")]
    TooLarge { size: usize, max_mb: usize },
    #[error("Invalid image format. Allowed: jpeg, jpg, png, webp")]
    UnsupportedFormat(String),
    #[error("Image could not be decoded")]
    Undecodable(String),
    #[error("Image could not be encoded")]
    EncodeFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    pub max_bytes: usize,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_dimension: 2048,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl NormalizedImage {
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = |side: u32| -> u32 {
        let scaled = (side as f64 * max_dimension as f64 / longest as f64).round() as u32;
        scaled.clamp(1, max_dimension)
    };
    if width >= height {
        (max_dimension, scale(height))
    } else {
        (scale(width), max_dimension)
    }
}

pub fn normalize(
    bytes: &[u8],
    mime_type: &str,
    limits: &ImageLimits,
) -> Result<NormalizedImage, ImageError> {
    if bytes.len() > limits.max_bytes {
        return Err(ImageError::TooLarge {
            size: bytes.len(),
            max_mb: limits.max_bytes / 1024 / 1024,
        });
    }

    let declared = ImageMime::parse(mime_type)
        .ok_or_else(|| ImageError::UnsupportedFormat(mime_type.to_string()))?;

    if let Some(sniffed) = detect_mime_type(bytes) {
        if ImageMime::parse(&sniffed) != Some(declared) {
            warn!(
                "Declared image type {} does not match content ({})",
                declared.as_str(),
                sniffed
            );
        }
    }

    let decoded =
        image::load_from_memory(bytes).map_err(|err| ImageError::Undecodable(err.to_string()))?;
    let (width, height) = decoded.dimensions();
    let (target_width, target_height) = fit_within(width, height, limits.max_dimension);

    let resized = if (target_width, target_height) != (width, height) {
        decoded.resize_exact(target_width, target_height, FilterType::Triangle)
    } else {
        decoded
    };
    let rgb = resized.to_rgb8();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, limits.jpeg_quality)
        .encode(
            rgb.as_raw(),
            target_width,
            target_height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|err| ImageError::EncodeFailed(err.to_string()))?;

    debug!(
        "Image processed: {} -> {} bytes, {}x{} -> {}x{}",
        bytes.len(),
        encoded.len(),
        width,
        height,
        target_width,
        target_height
    );

    Ok(NormalizedImage {
        bytes: encoded,
        mime_type: OUTPUT_MIME_TYPE,
        width: target_width,
        height: target_height,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 199) as u8])
        });
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn fit_within_hits_the_bound_on_the_longer_side() {
        assert_eq!(fit_within(3000, 1500, 2048), (2048, 1024));
        assert_eq!(fit_within(1500, 3000, 2048), (1024, 2048));
        assert_eq!(fit_within(4097, 10, 2048), (2048, 5));
        assert_eq!(fit_within(10000, 1, 2048), (2048, 1));
        assert_eq!(fit_within(2049, 2049, 2048), (2048, 2048));
    }

    #[test]
    fn fit_within_never_enlarges() {
        assert_eq!(fit_within(2048, 2048, 2048), (2048, 2048));
        assert_eq!(fit_within(640, 480, 2048), (640, 480));
        assert_eq!(fit_within(1, 1, 2048), (1, 1));
    }

    #[test]
    fn downscales_oversized_images() {
        let bytes = png_bytes(2600, 1300);
        let normalized = normalize(&bytes, "image/png", &ImageLimits::default()).unwrap();
        assert_eq!((normalized.width, normalized.height), (2048, 1024));
        assert_eq!(normalized.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&normalized.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (2048, 1024));
    }

    #[test]
    fn keeps_small_images_at_their_size() {
        let bytes = png_bytes(320, 200);
        let normalized = normalize(&bytes, "png", &ImageLimits::default()).unwrap();
        assert_eq!((normalized.width, normalized.height), (320, 200));
    }

    #[test]
    fn output_is_deterministic_and_idempotent_in_shape() {
        let bytes = png_bytes(2300, 900);
        let limits = ImageLimits::default();
        let first = normalize(&bytes, "image/png", &limits).unwrap();
        let second = normalize(&bytes, "image/png", &limits).unwrap();
        assert_eq!(first.bytes, second.bytes);

        let again = normalize(&first.bytes, "image/jpeg", &limits).unwrap();
        assert_eq!((again.width, again.height), (first.width, first.height));
        assert!(again.bytes.len() <= limits.max_bytes);
    }

    #[test]
    fn rejects_oversized_payloads() {
        let limits = ImageLimits {
            max_bytes: 16,
            ..ImageLimits::default()
        };
        let err = normalize(&[0u8; 17], "image/png", &limits).unwrap_err();
        assert!(matches!(err, ImageError::TooLarge { size: 17, .. }));
    }

    #[test]
    fn rejects_unsupported_types_and_garbage() {
        let limits = ImageLimits::default();
        assert!(matches!(
            normalize(&png_bytes(4, 4), "image/gif", &limits),
            Err(ImageError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            normalize(b"definitely not an image", "image/jpeg", &limits),
            Err(ImageError::Undecodable(_))
        ));
    }

    #[test]
    fn data_uri_carries_jpeg_prefix() {
        let normalized = normalize(&png_bytes(8, 8), "image/png", &ImageLimits::default()).unwrap();
        assert!(normalized
            .to_data_uri()
            .starts_with("data:image/jpeg;base64,"));
    }
}

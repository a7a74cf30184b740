use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat as ImgFormat, Rgba, RgbaImage};

use crate::config::Quality;
use crate::error::ConversionError;
use crate::format::OutputFormat;

/// Renders a raster image into a target format.
pub trait RasterEncoder: Send + Sync {
    fn encode(
        &self,
        image: &DynamicImage,
        target: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, ConversionError>;
}

/// Encoder backed by `image`, with `webp` for lossy WebP.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageEncoder;

impl RasterEncoder for ImageEncoder {
    fn encode(
        &self,
        image: &DynamicImage,
        target: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, ConversionError> {
        let canvas = compose_canvas(image, target);
        let (width, height) = canvas.dimensions();

        log::debug!(
            "Encoding {}x{} canvas to {} (quality {})",
            width,
            height,
            target.extension(),
            if target.supports_quality() { quality.to_string() } else { "n/a".into() }
        );

        let output = match target {
            OutputFormat::Jpeg => encode_jpeg(canvas, quality)?,
            OutputFormat::Webp => encode_webp(&canvas, quality)?,
            OutputFormat::Bmp => write_with(DynamicImage::ImageRgba8(canvas).into_rgb8().into(), ImgFormat::Bmp)?,
            OutputFormat::Png => write_with(DynamicImage::ImageRgba8(canvas), ImgFormat::Png)?,
            OutputFormat::Gif => write_with(DynamicImage::ImageRgba8(canvas), ImgFormat::Gif)?,
            OutputFormat::Tiff => write_with(DynamicImage::ImageRgba8(canvas), ImgFormat::Tiff)?,
        };

        log::debug!("Encoded {} bytes ({})", output.len(), target.extension());
        Ok(output)
    }
}

/// Output canvas with the source's dimensions. Targets without alpha start
/// from opaque white so transparent regions do not come out black.
fn compose_canvas(image: &DynamicImage, target: OutputFormat) -> RgbaImage {
    let source = image.to_rgba8();
    if target.supports_alpha() {
        return source;
    }
    let mut canvas = RgbaImage::from_pixel(source.width(), source.height(), Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut canvas, &source, 0, 0);
    canvas
}

fn write_with(image: DynamicImage, format: ImgFormat) -> Result<Vec<u8>, ConversionError> {
    let mut output = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut output), format)
        .map_err(|e| ConversionError::Encode(format!("Failed to encode {:?}: {}", format, e)))?;
    Ok(output)
}

fn encode_jpeg(canvas: RgbaImage, quality: Quality) -> Result<Vec<u8>, ConversionError> {
    let rgb = DynamicImage::ImageRgba8(canvas).into_rgb8();
    // JpegEncoder takes 1..=100; factor 0.0 maps to the lowest setting.
    let q = ((quality.factor() * 100.0).round() as u8).clamp(1, 100);

    let mut output = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut output), q);
        encoder
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
            .map_err(|e| ConversionError::Encode(format!("Failed to encode JPEG: {}", e)))?;
    }
    Ok(output)
}

fn encode_webp(canvas: &RgbaImage, quality: Quality) -> Result<Vec<u8>, ConversionError> {
    if canvas.width() == 0 || canvas.height() == 0 {
        return Err(ConversionError::Encode("Failed to encode WebP: empty image".into()));
    }
    let encoder = webp::Encoder::from_rgba(canvas.as_raw(), canvas.width(), canvas.height());
    let encoded = encoder
        .encode_simple(false, quality.factor() * 100.0)
        .map_err(|e| ConversionError::Encode(format!("Failed to encode WebP: {:?}", e)))?;
    Ok(encoded.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x * y) % 256) as u8, 255])
        }))
    }

    #[test]
    fn test_every_target_decodes_back() {
        let source = gradient(24, 16);
        for target in OutputFormat::ALL {
            let bytes = ImageEncoder.encode(&source, target, Quality::default()).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(decoded.dimensions(), (24, 16), "target {target}");
        }
    }

    #[test]
    fn test_jpeg_quality_is_monotonic() {
        let source = gradient(128, 128);
        let low = ImageEncoder.encode(&source, OutputFormat::Jpeg, Quality::new(50)).unwrap();
        let high = ImageEncoder.encode(&source, OutputFormat::Jpeg, Quality::new(100)).unwrap();
        assert!(low.len() <= high.len());
    }

    #[test]
    fn test_transparent_source_gets_white_background() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0])));

        let bmp = ImageEncoder.encode(&source, OutputFormat::Bmp, Quality::MAX).unwrap();
        let decoded = image::load_from_memory(&bmp).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(3, 3).0, [255, 255, 255]);

        let jpeg = ImageEncoder.encode(&source, OutputFormat::Jpeg, Quality::MAX).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert!(decoded.get_pixel(3, 3).0.iter().all(|&c| c > 245));
    }

    #[test]
    fn test_png_keeps_alpha() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 0])));
        let png = ImageEncoder.encode(&source, OutputFormat::Png, Quality::MAX).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_quality_ignored_for_lossless() {
        let source = gradient(32, 32);
        let a = ImageEncoder.encode(&source, OutputFormat::Png, Quality::new(5)).unwrap();
        let b = ImageEncoder.encode(&source, OutputFormat::Png, Quality::new(100)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_image_fails_without_panic() {
        let source = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        let err = ImageEncoder.encode(&source, OutputFormat::Webp, Quality::MAX).unwrap_err();
        assert_eq!(err.kind(), "EncodeError");
    }
}

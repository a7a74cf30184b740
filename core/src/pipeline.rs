use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;

use crate::config::Quality;
use crate::encoder::RasterEncoder;
use crate::error::ConversionError;
use crate::format::{output_name, InputFormat, MediaKind, OutputFormat};
use crate::intake::QueuedFile;
use crate::video::FrameExtractor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(ConversionError),
}

/// Result for one source file. Failures carry no bytes.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub source_name: String,
    pub target_format: OutputFormat,
    pub output_name: String,
    pub encoded_bytes: Bytes,
    pub byte_size: u64,
    pub outcome: Outcome,
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn error(&self) -> Option<&ConversionError> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failure(e) => Some(e),
        }
    }
}

/// Per-file orchestration: decode, extract a frame for videos, encode.
pub struct ConversionPipeline {
    extractor: FrameExtractor,
    encoder: Arc<dyn RasterEncoder>,
}

impl ConversionPipeline {
    pub fn new(extractor: FrameExtractor, encoder: Arc<dyn RasterEncoder>) -> Self {
        Self { extractor, encoder }
    }

    /// Convert one file. Never returns an error: every stage failure becomes
    /// a `Failure` result.
    pub async fn convert(&self, file: &QueuedFile, target: OutputFormat, quality: Quality) -> ConversionResult {
        let output_name = output_name(&file.name, target);
        match self.run(file, target, quality).await {
            Ok(encoded) => {
                let encoded = Bytes::from(encoded);
                ConversionResult {
                    source_name: file.name.clone(),
                    target_format: target,
                    output_name,
                    byte_size: encoded.len() as u64,
                    encoded_bytes: encoded,
                    outcome: Outcome::Success,
                }
            }
            Err(e) => {
                log::warn!("Error converting {}: {}", file.name, e);
                ConversionResult {
                    source_name: file.name.clone(),
                    target_format: target,
                    output_name,
                    encoded_bytes: Bytes::new(),
                    byte_size: 0,
                    outcome: Outcome::Failure(e),
                }
            }
        }
    }

    async fn run(&self, file: &QueuedFile, target: OutputFormat, quality: Quality) -> Result<Vec<u8>, ConversionError> {
        let raster = match file.kind() {
            MediaKind::Video => {
                self.extractor
                    .extract(file.raw_bytes.clone(), file.format, &file.name)
                    .await?
            }
            MediaKind::Image => decode_image(file.raw_bytes.clone(), file.format).await?,
        };

        log::debug!(
            "Converting {}: {}x{} pixels to {}",
            file.name,
            raster.width(),
            raster.height(),
            target.extension()
        );

        let encoder = Arc::clone(&self.encoder);
        tokio::task::spawn_blocking(move || encoder.encode(&raster, target, quality))
            .await
            .map_err(|e| ConversionError::Encode(format!("encoder task failed: {}", e)))?
    }
}

async fn decode_image(data: Bytes, format: InputFormat) -> Result<DynamicImage, ConversionError> {
    let hint = format
        .image_format()
        .ok_or_else(|| ConversionError::UnsupportedFormat(format.as_str().to_string()))?;

    tokio::task::spawn_blocking(move || {
        image::load_from_memory_with_format(&data, hint)
            .map_err(|e| ConversionError::Decode(format!("Failed to load image: {}", e)))
    })
    .await
    .map_err(|e| ConversionError::Decode(format!("decoder task failed: {}", e)))?
}

//! Representative-frame extraction for video inputs.
//!
//! Decoding runs on the blocking pool. The decoder reports through a
//! [`CompletionLatch`], so only its first completion signal counts, and the
//! caller waits at most `timeout` for it. On expiry the receiver is dropped
//! and the latch reports itself abandoned; sources poll that and stop their
//! work, so no blocking job outlives the wait by more than a poll interval.

pub mod ffmpeg;
pub mod latch;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::DynamicImage;

use crate::error::ConversionError;
use crate::format::InputFormat;

pub use ffmpeg::FfmpegDecoder;
pub use latch::CompletionLatch;

/// Frame size used when the container does not report dimensions.
pub const FALLBACK_DIMENSIONS: (u32, u32) = (800, 600);

/// Upper bound on the seek position, in seconds.
const MAX_SEEK_SECS: f64 = 1.0;
/// Fraction of the duration to seek to for short clips.
const SEEK_FRACTION: f64 = 0.1;
/// Pixels inspected by the empty-frame check; larger frames are strided.
const MAX_SAMPLES: usize = 65_536;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoMetadata {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Where to seek and what size to render the frame at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    pub timestamp_secs: f64,
    pub width: u32,
    pub height: u32,
}

impl SeekRequest {
    pub fn for_metadata(meta: &VideoMetadata) -> Self {
        let (width, height) = match (meta.width, meta.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => FALLBACK_DIMENSIONS,
        };
        Self {
            timestamp_secs: seek_timestamp(meta.duration_secs),
            width,
            height,
        }
    }
}

/// `min(1s, duration * 0.1)`. Unknown or invalid durations seek to the start.
pub fn seek_timestamp(duration_secs: Option<f64>) -> f64 {
    match duration_secs {
        Some(d) if d.is_finite() && d > 0.0 => (d * SEEK_FRACTION).min(MAX_SEEK_SECS),
        _ => 0.0,
    }
}

/// Completion signal delivered by a decoder.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    Rendered(DynamicImage),
    Failed(ConversionError),
}

pub type FrameLatch = CompletionLatch<FrameEvent>;

/// Backend able to open a video blob.
pub trait VideoDecoder: Send + Sync {
    fn open(&self, data: Bytes, format: InputFormat) -> Result<Box<dyn VideoSource>, ConversionError>;
}

/// An opened video. Methods block; they run on the blocking pool and should
/// return early once `done.is_abandoned()`.
pub trait VideoSource: Send {
    fn metadata(&mut self, done: &FrameLatch) -> Result<VideoMetadata, ConversionError>;

    /// Render the frame at `request.timestamp_secs`, sized
    /// `request.width x request.height`, and signal `done`. Signalling more
    /// than once is allowed; only the first signal is used.
    fn seek(&mut self, request: &SeekRequest, done: &FrameLatch);
}

pub struct FrameExtractor {
    decoder: Arc<dyn VideoDecoder>,
    timeout: Duration,
}

impl FrameExtractor {
    pub fn new(decoder: Arc<dyn VideoDecoder>, timeout: Duration) -> Self {
        Self { decoder, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Extract one representative frame. Resolves exactly once: a frame, or
    /// `Decode`, `FrameExtractionTimeout` or `EmptyFrameDetected`.
    pub async fn extract(
        &self,
        data: Bytes,
        format: InputFormat,
        source_name: &str,
    ) -> Result<DynamicImage, ConversionError> {
        let (latch, done) = FrameLatch::new();
        let decoder = Arc::clone(&self.decoder);
        let name = source_name.to_string();

        // Not awaited: on timeout the receiver is dropped, which the job
        // observes through `FrameLatch::is_abandoned`.
        let _detached = tokio::task::spawn_blocking(move || run_decode(decoder.as_ref(), data, format, &name, &latch));

        let event = match tokio::time::timeout(self.timeout, done).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) => {
                return Err(ConversionError::Decode(format!(
                    "decoder stopped without producing a frame for {}",
                    source_name
                )))
            }
            Err(_) => {
                log::warn!("Frame extraction for {} timed out after {:?}", source_name, self.timeout);
                return Err(ConversionError::FrameExtractionTimeout(self.timeout.as_millis() as u64));
            }
        };

        let frame = match event {
            FrameEvent::Rendered(frame) => frame,
            FrameEvent::Failed(err) => return Err(err),
        };

        if is_empty_frame(&frame) {
            return Err(ConversionError::EmptyFrameDetected);
        }
        Ok(frame)
    }
}

fn run_decode(decoder: &dyn VideoDecoder, data: Bytes, format: InputFormat, name: &str, latch: &FrameLatch) {
    let mut source = match decoder.open(data, format) {
        Ok(source) => source,
        Err(e) => {
            latch.resolve(FrameEvent::Failed(e));
            return;
        }
    };

    let meta = match source.metadata(latch) {
        Ok(meta) => meta,
        Err(e) => {
            latch.resolve(FrameEvent::Failed(e));
            return;
        }
    };
    if latch.is_abandoned() {
        log::debug!("Extraction of {} abandoned before seeking", name);
        return;
    }

    let request = SeekRequest::for_metadata(&meta);
    log::debug!(
        "Seeking {} to {:.3}s (duration {:?}), rendering {}x{}",
        name,
        request.timestamp_secs,
        meta.duration_secs,
        request.width,
        request.height
    );

    source.seek(&request, latch);
}

/// True when every sampled pixel has all RGB channels at zero.
pub fn is_empty_frame(frame: &DynamicImage) -> bool {
    let rgb = frame.to_rgb8();
    let total = (rgb.width() as usize) * (rgb.height() as usize);
    let stride = (total / MAX_SAMPLES).max(1);
    rgb.pixels().step_by(stride).all(|p| p.0 == [0, 0, 0])
}

//! ffmpeg-backed video decoding.
//!
//! The blob is staged in a temp file carrying the container's extension.
//! Metadata comes from the MP4 box tree for mp4/mov, otherwise from ffprobe;
//! the frame is rendered by ffmpeg as a PNG on stdout. Child processes are
//! killed as soon as the waiting caller has given up.

use std::ffi::OsString;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tempfile::NamedTempFile;

use super::{FrameEvent, FrameLatch, SeekRequest, VideoDecoder, VideoMetadata, VideoSource};
use crate::error::ConversionError;
use crate::format::InputFormat;

/// How often a running child is checked for exit or abandonment.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: OsString,
    ffprobe: OsString,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
        }
    }
}

impl FfmpegDecoder {
    pub fn with_tools(ffmpeg: impl Into<OsString>, ffprobe: impl Into<OsString>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        is_tool_available(&self.ffmpeg)
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, data: Bytes, format: InputFormat) -> Result<Box<dyn VideoSource>, ConversionError> {
        if !self.is_available() {
            return Err(ConversionError::Decode(
                "ffmpeg not found - frame extraction requires ffmpeg".to_string(),
            ));
        }

        let mut staged = tempfile::Builder::new()
            .prefix("batch_converter_")
            .suffix(&format!(".{}", format.extension()))
            .tempfile()
            .map_err(|e| ConversionError::Decode(format!("Failed to create temp input: {}", e)))?;
        staged
            .write_all(&data)
            .and_then(|_| staged.flush())
            .map_err(|e| ConversionError::Decode(format!("Failed to write temp input: {}", e)))?;

        Ok(Box::new(FfmpegSource {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            data,
            format,
            staged,
        }))
    }
}

struct FfmpegSource {
    ffmpeg: OsString,
    ffprobe: OsString,
    data: Bytes,
    format: InputFormat,
    // Removed from disk on drop.
    staged: NamedTempFile,
}

impl VideoSource for FfmpegSource {
    fn metadata(&mut self, done: &FrameLatch) -> Result<VideoMetadata, ConversionError> {
        if matches!(self.format, InputFormat::Mp4 | InputFormat::Mov) {
            match read_mp4_metadata(&self.data) {
                Ok(meta) => return Ok(meta),
                Err(e) => log::debug!("MP4 header unreadable ({}), falling back to ffprobe", e),
            }
        }
        probe_metadata(&self.ffprobe, self.staged.path(), done)
    }

    fn seek(&mut self, request: &SeekRequest, done: &FrameLatch) {
        let event = match render_frame(&self.ffmpeg, self.staged.path(), request, done) {
            Ok(frame) => FrameEvent::Rendered(frame),
            Err(e) => FrameEvent::Failed(e),
        };
        done.resolve(event);
    }
}

fn is_tool_available(tool: &OsString) -> bool {
    Command::new(tool)
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn read_mp4_metadata(data: &[u8]) -> Result<VideoMetadata, ConversionError> {
    let mp4 = mp4::Mp4Reader::read_header(Cursor::new(data), data.len() as u64)
        .map_err(|e| ConversionError::Decode(e.to_string()))?;

    let video = mp4
        .tracks()
        .values()
        .find(|t| matches!(t.track_type(), Ok(mp4::TrackType::Video)));

    let (width, height) = match video {
        Some(track) => (Some(u32::from(track.width())), Some(u32::from(track.height()))),
        None => (None, None),
    };

    Ok(VideoMetadata {
        duration_secs: Some(mp4.duration().as_secs_f64()),
        width,
        height,
    })
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

fn probe_metadata(ffprobe: &OsString, path: &Path, done: &FrameLatch) -> Result<VideoMetadata, ConversionError> {
    let mut cmd = Command::new(ffprobe);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path);
    let output = run_tool(&mut cmd, done)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ConversionError::Decode(format!("ffprobe failed: {}", stderr.trim())));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_output(json: &str) -> Result<VideoMetadata, ConversionError> {
    let probe: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ConversionError::Decode(format!("Invalid ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ConversionError::Decode("no video stream".to_string()))?;

    let duration_secs = probe
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());

    Ok(VideoMetadata {
        duration_secs,
        width: video.width,
        height: video.height,
    })
}

fn frame_args(path: &Path, request: &SeekRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.extend(["-v", "error", "-ss"].map(OsString::from));
    args.push(format!("{:.3}", request.timestamp_secs).into());
    args.push("-i".into());
    args.push(path.as_os_str().to_owned());
    args.extend(["-frames:v", "1", "-vf"].map(OsString::from));
    args.push(format!("scale={}:{}", request.width, request.height).into());
    args.extend(["-f", "image2pipe", "-vcodec", "png", "pipe:1"].map(OsString::from));
    args
}

fn render_frame(
    ffmpeg: &OsString,
    path: &Path,
    request: &SeekRequest,
    done: &FrameLatch,
) -> Result<image::DynamicImage, ConversionError> {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(frame_args(path, request));

    log::debug!("Rendering frame: ffmpeg {:?}", cmd.get_args().collect::<Vec<_>>());

    let output = run_tool(&mut cmd, done)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::error!("ffmpeg failed: {}", stderr);
        return Err(ConversionError::Decode(format!("ffmpeg failed: {}", stderr.trim())));
    }
    if output.stdout.is_empty() {
        return Err(ConversionError::Decode(format!(
            "no frame decoded at {:.3}s",
            request.timestamp_secs
        )));
    }

    image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png)
        .map_err(|e| ConversionError::Decode(format!("Unreadable frame from ffmpeg: {}", e)))
}

/// Run `cmd` to completion, killing it once `done` is abandoned.
fn run_tool(cmd: &mut Command, done: &FrameLatch) -> Result<Output, ConversionError> {
    let tool = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ConversionError::Decode(format!("Failed to execute {}: {}", tool, e)))?;

    // Both pipes drain in the background so a full pipe never stalls the child.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if done.is_abandoned() => {
                let _ = child.kill();
                let _ = child.wait();
                log::debug!("Killed {} after extraction was abandoned", tool);
                return Err(ConversionError::Decode(format!("{} abandoned", tool)));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(ConversionError::Decode(format!("Failed to wait for {}: {}", tool, e)));
            }
        }
    };

    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "audio"},
                {"index": 1, "codec_type": "video", "width": 1280, "height": 720}
            ],
            "format": {"filename": "x.webm", "duration": "12.500000"}
        }"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.width, Some(1280));
        assert_eq!(meta.height, Some(720));
        assert_eq!(meta.duration_secs, Some(12.5));
    }

    #[test]
    fn test_parse_probe_stream_duration_fallback() {
        let json = r#"{"streams": [{"codec_type": "video", "duration": "2.0"}]}"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.duration_secs, Some(2.0));
        assert_eq!(meta.width, None);
    }

    #[test]
    fn test_parse_probe_without_video() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert_eq!(parse_probe_output(json).unwrap_err().kind(), "DecodeError");
    }

    #[test]
    fn test_frame_args() {
        let request = SeekRequest {
            timestamp_secs: 0.25,
            width: 320,
            height: 240,
        };
        let args = frame_args(Path::new("/tmp/in.mp4"), &request);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "0.250");
        assert!(args.contains(&"scale=320:240".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_garbage_mp4_header_is_decode_error() {
        let err = read_mp4_metadata(b"definitely not an mp4").unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
    }

    #[test]
    fn test_missing_ffmpeg_is_decode_error() {
        let decoder = FfmpegDecoder::with_tools("nonexistent_ffmpeg_12345", "nonexistent_ffprobe_12345");
        assert!(!decoder.is_available());
        let err = decoder.open(Bytes::from_static(b"x"), InputFormat::Webm).err().unwrap();
        assert_eq!(err.kind(), "DecodeError");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_collects_stdout() {
        let (latch, _rx) = FrameLatch::new();
        let mut cmd = Command::new("echo");
        cmd.arg("frame");
        let output = run_tool(&mut cmd, &latch).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "frame");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_kills_abandoned_child() {
        let (latch, rx) = FrameLatch::new();
        drop(rx);
        let mut cmd = Command::new("sleep");
        cmd.arg("5");

        let started = std::time::Instant::now();
        let err = run_tool(&mut cmd, &latch).unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

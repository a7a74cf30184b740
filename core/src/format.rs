use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Whether a queued file is decoded directly or goes through frame extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

/// Input formats accepted at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webm,
    Mp4,
    Avi,
    Mov,
}

impl InputFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(InputFormat::Png),
            "jpg" | "jpeg" | "jpe" => Some(InputFormat::Jpeg),
            "gif" => Some(InputFormat::Gif),
            "bmp" => Some(InputFormat::Bmp),
            "tif" | "tiff" => Some(InputFormat::Tiff),
            "webm" => Some(InputFormat::Webm),
            "mp4" | "m4v" => Some(InputFormat::Mp4),
            "avi" => Some(InputFormat::Avi),
            "mov" | "qt" => Some(InputFormat::Mov),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        Self::from_extension(path.extension()?.to_str()?)
    }

    /// Classify by declared MIME type, e.g. `image/png` or `video/x-msvideo`.
    /// Parameters after `;` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next()?.trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(InputFormat::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(InputFormat::Jpeg),
            "image/gif" => Some(InputFormat::Gif),
            "image/bmp" | "image/x-bmp" | "image/x-ms-bmp" => Some(InputFormat::Bmp),
            "image/tiff" | "image/tiff-fx" => Some(InputFormat::Tiff),
            "video/webm" => Some(InputFormat::Webm),
            "video/mp4" => Some(InputFormat::Mp4),
            "video/avi" | "video/x-msvideo" | "video/msvideo" => Some(InputFormat::Avi),
            "video/quicktime" => Some(InputFormat::Mov),
            _ => None,
        }
    }

    /// Declared type wins; the file name's extension is the fallback.
    pub fn detect(mime: Option<&str>, name: &str) -> Option<Self> {
        mime.and_then(Self::from_mime)
            .or_else(|| Self::from_path(Path::new(name)))
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            InputFormat::Png
            | InputFormat::Jpeg
            | InputFormat::Gif
            | InputFormat::Bmp
            | InputFormat::Tiff => MediaKind::Image,
            InputFormat::Webm | InputFormat::Mp4 | InputFormat::Avi | InputFormat::Mov => {
                MediaKind::Video
            }
        }
    }

    /// Decoder hint for raster inputs. `None` for video containers.
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        match self {
            InputFormat::Png => Some(image::ImageFormat::Png),
            InputFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            InputFormat::Gif => Some(image::ImageFormat::Gif),
            InputFormat::Bmp => Some(image::ImageFormat::Bmp),
            InputFormat::Tiff => Some(image::ImageFormat::Tiff),
            _ => None,
        }
    }

    /// Canonical extension, used when staging bytes for an external decoder.
    pub fn extension(&self) -> &'static str {
        match self {
            InputFormat::Png => "png",
            InputFormat::Jpeg => "jpeg",
            InputFormat::Gif => "gif",
            InputFormat::Bmp => "bmp",
            InputFormat::Tiff => "tiff",
            InputFormat::Webm => "webm",
            InputFormat::Mp4 => "mp4",
            InputFormat::Avi => "avi",
            InputFormat::Mov => "mov",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Png => "PNG",
            InputFormat::Jpeg => "JPEG",
            InputFormat::Gif => "GIF",
            InputFormat::Bmp => "BMP",
            InputFormat::Tiff => "TIFF",
            InputFormat::Webm => "WebM",
            InputFormat::Mp4 => "MP4",
            InputFormat::Avi => "AVI",
            InputFormat::Mov => "QuickTime",
        }
    }
}

/// Target format, chosen once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Png,
        OutputFormat::Jpeg,
        OutputFormat::Gif,
        OutputFormat::Bmp,
        OutputFormat::Tiff,
        OutputFormat::Webp,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Bmp => "image/bmp",
            OutputFormat::Tiff => "image/tiff",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Formats without an alpha channel get an opaque white background.
    pub fn supports_alpha(&self) -> bool {
        !matches!(self, OutputFormat::Jpeg | OutputFormat::Bmp)
    }

    /// Formats whose encoder takes a lossy quality knob.
    pub fn supports_quality(&self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Webp)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            "tif" | "tiff" => Ok(Self::Tiff),
            "webp" => Ok(Self::Webp),
            _ => Err(format!(
                "unknown output format: {s} (expected png, jpeg, gif, bmp, tiff or webp)"
            )),
        }
    }
}

/// Output file name: the source name with its last extension replaced by the
/// target format's extension. `photo.final.png` becomes `photo.final.jpeg`.
pub fn output_name(source_name: &str, target: OutputFormat) -> String {
    let base = match source_name.rfind('.') {
        Some(idx) if idx + 1 < source_name.len() && !source_name[idx + 1..].contains('/') => {
            &source_name[..idx]
        }
        _ => source_name,
    };
    format!("{}.{}", base, target.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_prefers_mime() {
        assert_eq!(
            InputFormat::detect(Some("video/quicktime"), "clip.png"),
            Some(InputFormat::Mov)
        );
        assert_eq!(InputFormat::detect(None, "clip.MOV"), Some(InputFormat::Mov));
        assert_eq!(
            InputFormat::detect(Some("application/octet-stream"), "scan.tif"),
            Some(InputFormat::Tiff)
        );
        assert_eq!(InputFormat::detect(Some("video/x-msvideo"), "a"), Some(InputFormat::Avi));
    }

    #[test]
    fn test_unsupported_inputs() {
        assert_eq!(InputFormat::detect(None, "notes.txt"), None);
        assert_eq!(InputFormat::detect(Some("image/webp"), "x.webp"), None);
        assert_eq!(InputFormat::detect(None, "no_extension"), None);
    }

    #[test]
    fn test_kind() {
        assert_eq!(InputFormat::Gif.kind(), MediaKind::Image);
        assert_eq!(InputFormat::Webm.kind(), MediaKind::Video);
        assert!(InputFormat::Avi.image_format().is_none());
    }

    #[test]
    fn test_output_format_parse_normalizes_jpg() {
        assert_eq!("jpg".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("JPEG".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::Jpeg.extension(), "jpeg");
        assert!("avif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_name() {
        assert_eq!(output_name("cat.png", OutputFormat::Jpeg), "cat.jpeg");
        assert_eq!(output_name("a.b.tiff", OutputFormat::Webp), "a.b.webp");
        assert_eq!(output_name("README", OutputFormat::Png), "README.png");
        assert_eq!(output_name("trailing.", OutputFormat::Gif), "trailing..gif");
    }

    #[test]
    fn test_alpha_and_quality_policy() {
        assert!(!OutputFormat::Jpeg.supports_alpha());
        assert!(!OutputFormat::Bmp.supports_alpha());
        assert!(OutputFormat::Png.supports_alpha());
        assert!(OutputFormat::Webp.supports_quality());
        assert!(!OutputFormat::Tiff.supports_quality());
    }
}
